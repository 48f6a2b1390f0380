//! Unit Tests for Directive Classification
//!
//! Keyword recognition, argument checking and whole-list validation.

use linkseq::directive::{Directive, DirectiveClassifier, DirectiveError};

fn classify(raw: &str) -> Result<Directive, DirectiveError> {
    DirectiveClassifier::default().classify(raw)
}

#[test]
fn test_keywords_are_case_insensitive() {
    assert_eq!(
        classify("IF ready"),
        Ok(Directive::If {
            flag: "ready".to_string()
        })
    );
    assert_eq!(classify("Else"), Ok(Directive::Else));
    assert_eq!(classify("  ENDIF  "), Ok(Directive::EndIf));
    assert_eq!(
        classify("Stop_If_Not armed"),
        Ok(Directive::StopIfNot {
            flag: "armed".to_string()
        })
    );
    assert_eq!(classify("WAIT 2"), Ok(Directive::Wait { seconds: 2.0 }));
}

#[test]
fn test_wait_arguments() {
    assert_eq!(classify("wait 0"), Ok(Directive::Wait { seconds: 0.0 }));
    assert_eq!(classify("wait 1.5"), Ok(Directive::Wait { seconds: 1.5 }));
    assert_eq!(classify("wait"), Err(DirectiveError::MissingWaitTime));
    assert!(matches!(
        classify("wait -1"),
        Err(DirectiveError::NegativeWaitTime(_))
    ));
    assert!(matches!(
        classify("wait soon"),
        Err(DirectiveError::NonNumericWaitTime(_))
    ));
    assert!(matches!(
        classify("wait NaN"),
        Err(DirectiveError::NonNumericWaitTime(_))
    ));
    assert!(matches!(
        classify("wait 3601"),
        Err(DirectiveError::WaitTimeExceedsMaximum { .. })
    ));
    assert!(matches!(
        classify("wait 1 2"),
        Err(DirectiveError::TooManyArguments { .. })
    ));
}

#[test]
fn test_custom_wait_limit() {
    let classifier = DirectiveClassifier::new(5.0, 1000);
    assert!(classifier.classify("wait 5").is_ok());
    assert!(classifier.classify("wait 5.01").is_err());
}

#[test]
fn test_flag_arguments() {
    assert!(matches!(
        classify("if"),
        Err(DirectiveError::MissingFlagName { .. })
    ));
    assert!(matches!(
        classify("if 9lives"),
        Err(DirectiveError::InvalidFlagName(_))
    ));
    assert!(matches!(
        classify("if a b"),
        Err(DirectiveError::TooManyArguments { .. })
    ));
    assert!(matches!(
        classify("else now"),
        Err(DirectiveError::TooManyArguments { .. })
    ));
}

#[test]
fn test_multizone_prefix() {
    assert_eq!(
        classify("og_multizone-fill_10"),
        Ok(Directive::Multizone {
            base_command: "fill_10".to_string()
        })
    );
    assert_eq!(
        classify("og_multizone-pre-heat"),
        Ok(Directive::Multizone {
            base_command: "pre-heat".to_string()
        })
    );
    assert_eq!(
        classify("OG_MULTIZONE- home "),
        Ok(Directive::Multizone {
            base_command: "home".to_string()
        })
    );
    assert_eq!(
        classify("og_multizone-"),
        Err(DirectiveError::MissingMultizoneBase)
    );
}

#[test]
fn test_multizone_base_must_be_an_identifier() {
    for raw in ["og_multizone-foo bar", "og_multizone-G1 X10", "og_multizone-a;b", "og_multizone-é"] {
        assert!(
            matches!(classify(raw), Err(DirectiveError::InvalidMultizoneBase(_))),
            "{} should be rejected",
            raw
        );
    }
    let report = DirectiveClassifier::default()
        .validate_sequence(&["home".to_string(), "og_multizone-foo bar".to_string()]);
    assert!(!report.is_valid);
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].starts_with("directive 2:"), "{}", report.errors[0]);
}

#[test]
fn test_everything_else_is_a_regular_command() {
    assert_eq!(
        classify(" G1 X10 "),
        Ok(Directive::Regular {
            command: "G1 X10".to_string()
        })
    );
    assert_eq!(
        classify("iffy"),
        Ok(Directive::Regular {
            command: "iffy".to_string()
        })
    );
    assert_eq!(classify("   "), Err(DirectiveError::Empty));
    assert!(matches!(
        DirectiveClassifier::new(3600.0, 4).classify("G1 X10"),
        Err(DirectiveError::TooLong { len: 6, max: 4 })
    ));
}

#[test]
fn test_validate_sequence_reports_every_problem() {
    let classifier = DirectiveClassifier::default();

    let report = classifier.validate_sequence(&["if a", "x", "else", "y", "endif"]);
    assert!(report.is_valid);
    assert!(report.errors.is_empty());

    let report = classifier.validate_sequence(&["else", "wait -2", "endif", "if a", "if b"]);
    assert!(!report.is_valid);
    assert_eq!(
        report.errors,
        vec![
            "directive 1: else without if".to_string(),
            "directive 2: wait time cannot be negative: -2".to_string(),
            "directive 3: endif without if".to_string(),
            "2 if block(s) without endif".to_string(),
        ]
    );

    let report = classifier.validate_sequence(&["if a", "else", "else", "endif"]);
    assert_eq!(
        report.errors,
        vec!["directive 3: duplicate else in if block".to_string()]
    );
}

#[test]
fn test_directive_helpers() {
    let directive = classify("stop_if_not armed").unwrap();
    assert_eq!(directive.flag(), Some("armed"));
    assert!(!classify("G28").unwrap().is_control());
    assert!(classify("endif").unwrap().is_control());
}
