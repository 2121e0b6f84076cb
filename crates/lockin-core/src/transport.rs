//! The transport boundary.
//!
//! The engine never assumes a particular wire protocol beyond request/
//! response text. Anything that can carry a command string to a device and
//! (for queries) bring a text response back implements [`Transport`]; the
//! engine serializes all access behind its own mutex, so implementations
//! take `&mut self` and need no internal locking.

use async_trait::async_trait;
use std::time::Duration;

/// Request/response text channel to one instrument connection.
///
/// Timeout handling is the implementation's responsibility: a round-trip
/// that exceeds `timeout` must fail with [`std::io::ErrorKind::TimedOut`].
/// The engine maps that to its timeout error and applies bounded retries;
/// every other I/O error kind is treated as a transient transport fault.
#[async_trait]
pub trait Transport: Send {
    /// Send a command with no expected response payload.
    async fn write(&mut self, command: &str, timeout: Duration) -> std::io::Result<()>;

    /// Send a command and wait for its text response.
    async fn query(&mut self, command: &str, timeout: Duration) -> std::io::Result<String>;
}

#[async_trait]
impl Transport for Box<dyn Transport> {
    async fn write(&mut self, command: &str, timeout: Duration) -> std::io::Result<()> {
        (**self).write(command, timeout).await
    }

    async fn query(&mut self, command: &str, timeout: Duration) -> std::io::Result<String> {
        (**self).query(command, timeout).await
    }
}
