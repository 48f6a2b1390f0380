//! Test Fixtures
//!
//! Sequence libraries and a ready-wired runner backed by [`MockLink`].

use super::mock_link::MockLink;
use linkseq::events::EventBus;
use linkseq::executor::ResponseRouter;
use linkseq::{Config, SequenceRunner};
use std::collections::HashMap;
use std::sync::Arc;

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Config with short timeouts so failure paths finish quickly
pub fn fast_config() -> Config {
    let mut config = Config::default();
    config.execution.command_timeout_ms = 300;
    config.execution.zone_select_timeout_ms = 300;
    config.execution.poll_interval_ms = 10;
    config
}

/// A small printer-like library exercising buttons, nesting and control flow
pub fn create_test_config() -> Config {
    let mut config = fast_config();
    config.buttons = HashMap::from([
        ("home".to_string(), "G28".to_string()),
        ("heat".to_string(), "M104 S200".to_string()),
        ("purge".to_string(), "G1 E10".to_string()),
    ]);
    config.sequences = HashMap::from([
        ("warmup".to_string(), strings(&["home", "heat"])),
        (
            "prime".to_string(),
            strings(&["warmup", "wait 0.01", "purge"]),
        ),
        (
            "guarded".to_string(),
            strings(&["if nozzle_ready", "purge", "else", "heat", "endif"]),
        ),
        (
            "fill_all".to_string(),
            strings(&["home", "og_multizone-fill"]),
        ),
        ("long_wait".to_string(), strings(&["wait 10"])),
    ]);
    config
}

/// Runner wired to a [`MockLink`] through a shared router
pub struct TestRig {
    pub runner: Arc<SequenceRunner>,
    pub link: Arc<MockLink>,
    pub router: Arc<ResponseRouter>,
}

pub fn create_test_rig(config: &Config) -> TestRig {
    let router = Arc::new(ResponseRouter::new(EventBus::new(256)));
    let link = Arc::new(MockLink::new(Arc::clone(&router)));
    let runner = SequenceRunner::from_config(config, link.clone(), Arc::clone(&router))
        .expect("test config is valid");
    TestRig {
        runner: Arc::new(runner),
        link,
        router,
    }
}
