//! Device link abstraction
//!
//! The executor only needs to write a command and know whether the device is
//! still there. Inbound lines travel the other way through
//! [`ResponseRouter::push`](crate::executor::ResponseRouter::push), driven by
//! whatever reads the link.

pub mod channel;
pub mod decoder;
pub mod stream;

pub use channel::{spawn_simulated_device, ChannelLink};
pub use decoder::LineDecoder;
pub use stream::StreamLink;

use async_trait::async_trait;

/// Outbound half of a line-oriented device connection
#[async_trait]
pub trait DeviceLink: Send + Sync {
    /// Write one command; `false` when the write failed or the link is down
    async fn send_command(&self, command: &str) -> bool;

    fn is_connected(&self) -> bool;
}
