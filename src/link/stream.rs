//! Link over any async byte stream
//!
//! A reader task decodes device output into lines and pushes them into the
//! [`ResponseRouter`]; commands are written under an async lock. When the
//! reader sees EOF or an error the link reports itself disconnected.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use super::{DeviceLink, LineDecoder};
use crate::executor::ResponseRouter;

const READ_BUFFER_SIZE: usize = 1024;

pub struct StreamLink<W> {
    writer: Mutex<W>,
    connected: Arc<AtomicBool>,
    line_terminator: String,
    reader_task: JoinHandle<()>,
}

impl<W> StreamLink<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    /// Start reading `reader` into `router` and return the write side
    pub fn spawn<R>(
        reader: R,
        writer: W,
        router: Arc<ResponseRouter>,
        line_terminator: impl Into<String>,
    ) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let connected = Arc::new(AtomicBool::new(true));
        let reader_task = tokio::spawn(read_lines(reader, router, Arc::clone(&connected)));
        Self {
            writer: Mutex::new(writer),
            connected,
            line_terminator: line_terminator.into(),
            reader_task,
        }
    }

    /// Mark the link down and stop the reader
    pub fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.reader_task.abort();
    }
}

async fn read_lines<R>(mut reader: R, router: Arc<ResponseRouter>, connected: Arc<AtomicBool>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut decoder = LineDecoder::default();
    let mut buf = [0u8; READ_BUFFER_SIZE];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => {
                info!("Device stream closed");
                break;
            }
            Ok(n) => {
                for line in decoder.feed(&buf[..n]) {
                    router.push(&line);
                }
            }
            Err(e) => {
                error!("Device read failed: {}", e);
                break;
            }
        }
    }
    if let Some(line) = decoder.finish() {
        router.push(&line);
    }
    connected.store(false, Ordering::SeqCst);
}

#[async_trait]
impl<W> DeviceLink for StreamLink<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    async fn send_command(&self, command: &str) -> bool {
        if !self.is_connected() {
            return false;
        }
        let mut writer = self.writer.lock().await;
        let mut frame = String::with_capacity(command.len() + self.line_terminator.len());
        frame.push_str(command);
        frame.push_str(&self.line_terminator);

        let result = async {
            writer.write_all(frame.as_bytes()).await?;
            writer.flush().await
        }
        .await;

        match result {
            Ok(()) => {
                debug!("Wrote command: {}", command);
                true
            }
            Err(e) => {
                error!("Failed to write '{}': {}", command, e);
                self.connected.store(false, Ordering::SeqCst);
                false
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

impl<W> Drop for StreamLink<W> {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}
