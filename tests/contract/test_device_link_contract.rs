//! Contract Tests for Device Links
//!
//! Every [`DeviceLink`] backend must:
//!
//! - accept writes while connected and report `true`
//! - refuse writes with `false` once disconnected, without panicking
//! - report connectivity without blocking

#[path = "../test_utils/mod.rs"]
mod test_utils;

use linkseq::events::EventBus;
use linkseq::executor::ResponseRouter;
use linkseq::link::{ChannelLink, DeviceLink, StreamLink};
use std::sync::Arc;
use test_utils::MockLink;

async fn assert_accepts_while_connected(link: &dyn DeviceLink) {
    assert!(link.is_connected());
    assert!(link.send_command("G28").await);
    assert!(link.send_command("").await);
}

fn router() -> Arc<ResponseRouter> {
    Arc::new(ResponseRouter::new(EventBus::default()))
}

#[tokio::test]
async fn test_channel_link_contract() {
    let (link, mut rx) = ChannelLink::pair();
    assert_accepts_while_connected(&link).await;
    assert_eq!(rx.recv().await.as_deref(), Some("G28"));

    link.disconnect();
    assert!(!link.is_connected());
    assert!(!link.send_command("G28").await);
}

#[tokio::test]
async fn test_stream_link_contract() {
    let (host, _device) = tokio::io::duplex(256);
    let (read, write) = tokio::io::split(host);
    let link = StreamLink::spawn(read, write, router(), "\n");
    assert_accepts_while_connected(&link).await;

    link.close();
    assert!(!link.is_connected());
    assert!(!link.send_command("G28").await);
}

#[tokio::test]
async fn test_mock_link_contract() {
    let link = MockLink::new(router());
    assert_accepts_while_connected(&link).await;

    link.set_connected(false);
    assert!(!link.is_connected());
    assert!(!link.send_command("G28").await);
}

#[test]
fn test_links_are_usable_as_trait_objects() {
    let (channel, _rx) = ChannelLink::pair();
    let links: Vec<Arc<dyn DeviceLink>> = vec![Arc::new(channel), Arc::new(MockLink::new(router()))];
    for link in links {
        assert!(tokio_test::block_on(link.send_command("M105")));
    }
}
