//! Integration Tests for Device Signals
//!
//! `NAME:VALUE` lines arriving during a run update variables, and boolean
//! signals steer later `if` and `stop_if_not` directives.

#[path = "../test_utils/mod.rs"]
mod test_utils;

use linkseq::{SequenceEvent, SignalType};
use serde_json::json;
use test_utils::{create_test_rig, fast_config};

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn signal_config() -> linkseq::Config {
    let mut config = fast_config();
    config.buttons.insert("check_door".to_string(), "M119".to_string());
    config.signals.insert("DOOR".to_string(), "door_closed (bool)".to_string());
    config.signals.insert("TEMP".to_string(), "temperature (float)".to_string());
    config.sequences.insert(
        "guarded_fill".to_string(),
        strings(&["check_door", "if door_closed", "fill", "else", "alarm", "endif"]),
    );
    config
}

#[tokio::test]
async fn test_config_mappings_are_loaded() {
    let rig = create_test_rig(&signal_config());

    let mappings = rig.runner.signals().mappings();
    assert_eq!(mappings.len(), 2);
    assert_eq!(mappings[0].signal_name, "DOOR");
    assert_eq!(mappings[0].signal_type, SignalType::Bool);
    assert_eq!(mappings[1].to_string(), "temperature (float)");
}

#[tokio::test]
async fn test_bool_signal_selects_branch() {
    let rig = create_test_rig(&signal_config());
    rig.link
        .reply_to("M119", &["DOOR:closed?", "DOOR:yes", "TEMP:21.5", "complete"]);

    let outcome = rig.runner.run("guarded_fill").await.unwrap();
    assert!(outcome.success, "{}", outcome.message);
    assert_eq!(rig.link.sent(), vec!["M119", "fill"]);
    assert!(rig.runner.flags().get("door_closed"));
    assert_eq!(
        rig.runner.signals().get_variable("temperature"),
        Some(json!(21.5))
    );

    let stats = rig.runner.signals().statistics();
    assert_eq!(stats.processed, 3);
    assert_eq!(stats.errors, 1);
}

#[tokio::test]
async fn test_signal_lowering_flag_takes_else_branch() {
    let rig = create_test_rig(&signal_config());
    rig.runner.set_flag("door_closed", true);
    rig.link.reply_to("M119", &["DOOR:0", "complete"]);

    let outcome = rig.runner.run("guarded_fill").await.unwrap();
    assert!(outcome.success, "{}", outcome.message);
    assert_eq!(rig.link.sent(), vec!["M119", "alarm"]);
}

#[tokio::test]
async fn test_signal_events_are_published() {
    let rig = create_test_rig(&signal_config());
    let mut events = rig.runner.events().subscribe();

    rig.router.push("TEMP:200");
    rig.router.push("DOOR:off");
    rig.router.push("HUMIDITY:40");

    let updates: Vec<SequenceEvent> = events
        .drain()
        .into_iter()
        .filter(|event| matches!(event, SequenceEvent::SignalUpdated { .. }))
        .collect();
    assert_eq!(
        updates,
        vec![
            SequenceEvent::SignalUpdated {
                signal: "TEMP".to_string(),
                variable: "temperature".to_string(),
                value: json!(200.0),
            },
            SequenceEvent::SignalUpdated {
                signal: "DOOR".to_string(),
                variable: "door_closed".to_string(),
                value: json!(false),
            },
        ]
    );
    assert!(rig.runner.flags().has("door_closed"));
    assert!(!rig.runner.flags().get("door_closed"));
}

#[tokio::test]
async fn test_invalid_signal_config_is_refused() {
    let mut config = signal_config();
    config
        .signals
        .insert("PRESSURE".to_string(), "pressure".to_string());

    let router = std::sync::Arc::new(linkseq::executor::ResponseRouter::new(
        linkseq::EventBus::new(16),
    ));
    let link = std::sync::Arc::new(test_utils::MockLink::new(std::sync::Arc::clone(&router)));
    let result = linkseq::SequenceRunner::from_config(&config, link, router);
    assert!(matches!(
        result,
        Err(linkseq::Error::SignalConfigInvalid { signal, .. }) if signal == "PRESSURE"
    ));
}
