//! Loopback mock instrument for tests and the demo session.
//!
//! Models the wire protocol only: a node store keyed by command path,
//! query-style writes that echo the written value as the acknowledgment,
//! and scripted faults (I/O errors, timeouts, rejection responses, delayed
//! acquisition data). No instrument physics.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lockin_core::Transport;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy)]
enum Fault {
    /// Let the call through.
    Pass,
    /// Fail with a generic I/O error.
    Broken,
    /// Fail with `ErrorKind::TimedOut`.
    Timeout,
}

#[derive(Debug, Default)]
struct MockState {
    nodes: HashMap<String, String>,
    /// Paths where writes append samples instead of replacing the node.
    vector_nodes: Vec<String>,
    /// Queries to these paths answer empty until the countdown drains.
    poll_countdown: HashMap<String, u32>,
    /// Scripted failures consumed one per transport call.
    faults: VecDeque<Fault>,
    /// Scripted responses consumed one per query, ahead of the node store.
    canned: VecDeque<String>,
    log: Vec<String>,
}

impl MockState {
    fn take_fault(&mut self) -> io::Result<()> {
        match self.faults.pop_front() {
            Some(Fault::Broken) => Err(io::Error::other("mock link broken")),
            Some(Fault::Timeout) => Err(io::Error::new(io::ErrorKind::TimedOut, "mock timeout")),
            Some(Fault::Pass) | None => Ok(()),
        }
    }

    fn apply(&mut self, command: &str) -> Option<String> {
        // Query-style write form: everything before the first space is the
        // node path, the rest is the payload.
        match command.split_once(' ') {
            Some((path, payload)) => {
                if self.vector_nodes.iter().any(|p| p == path) {
                    let node = self.nodes.entry(path.to_string()).or_default();
                    if node.is_empty() {
                        *node = payload.to_string();
                    } else {
                        node.push(',');
                        node.push_str(payload);
                    }
                } else {
                    self.nodes.insert(path.to_string(), payload.to_string());
                }
                Some(payload.to_string())
            }
            None => None,
        }
    }

    fn read(&mut self, path: &str) -> String {
        if let Some(remaining) = self.poll_countdown.get_mut(path) {
            if *remaining > 0 {
                *remaining -= 1;
                return String::new();
            }
        }
        self.nodes.get(path).cloned().unwrap_or_else(|| "0".to_string())
    }
}

/// The transport half, handed to the engine.
pub struct MockInstrument {
    state: Arc<Mutex<MockState>>,
}

/// The scripting half, kept by the test.
#[derive(Clone)]
pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockInstrument {
    pub fn new() -> (Self, MockHandle) {
        let state = Arc::new(Mutex::new(MockState::default()));
        (
            Self {
                state: Arc::clone(&state),
            },
            MockHandle { state },
        )
    }
}

impl MockHandle {
    /// Preload a node value.
    pub async fn set_node(&self, path: &str, value: &str) {
        self.state
            .lock()
            .await
            .nodes
            .insert(path.to_string(), value.to_string());
    }

    /// Current node value, if any write or preload reached it.
    pub async fn node(&self, path: &str) -> Option<String> {
        self.state.lock().await.nodes.get(path).cloned()
    }

    /// Every command the engine sent, in order.
    pub async fn log(&self) -> Vec<String> {
        self.state.lock().await.log.clone()
    }

    /// Writes to this path accumulate comma-separated payloads, the way a
    /// waveform memory accepts chunks.
    pub async fn mark_vector(&self, path: &str) {
        self.state.lock().await.vector_nodes.push(path.to_string());
    }

    /// Next `n` transport calls fail with a generic I/O error.
    pub async fn break_next(&self, n: u32) {
        let mut state = self.state.lock().await;
        state
            .faults
            .extend(std::iter::repeat(Fault::Broken).take(n as usize));
    }

    /// Next `n` transport calls time out.
    pub async fn timeout_next(&self, n: u32) {
        let mut state = self.state.lock().await;
        state
            .faults
            .extend(std::iter::repeat(Fault::Timeout).take(n as usize));
    }

    /// Let the next `ok_calls` transport calls through, then time out the
    /// `n` after them.
    pub async fn timeout_after(&self, ok_calls: u32, n: u32) {
        let mut state = self.state.lock().await;
        state
            .faults
            .extend(std::iter::repeat(Fault::Pass).take(ok_calls as usize));
        state
            .faults
            .extend(std::iter::repeat(Fault::Timeout).take(n as usize));
    }

    /// Next query answers with this exact response, ahead of the node
    /// store. Useful for rejection strings.
    pub async fn respond_next(&self, response: &str) {
        self.state.lock().await.canned.push_back(response.to_string());
    }

    /// Queries to this path answer empty for the next `polls` reads, then
    /// serve the node value. Models acquisition latency.
    pub async fn delay_data(&self, path: &str, polls: u32) {
        self.state
            .lock()
            .await
            .poll_countdown
            .insert(path.to_string(), polls);
    }
}

#[async_trait]
impl Transport for MockInstrument {
    async fn write(&mut self, command: &str, _timeout: Duration) -> io::Result<()> {
        let mut state = self.state.lock().await;
        state.log.push(command.to_string());
        state.take_fault()?;
        state.apply(command);
        Ok(())
    }

    async fn query(&mut self, command: &str, _timeout: Duration) -> io::Result<String> {
        let mut state = self.state.lock().await;
        state.log.push(command.to_string());
        state.take_fault()?;
        if let Some(canned) = state.canned.pop_front() {
            return Ok(canned);
        }
        match state.apply(command) {
            Some(ack) => Ok(ack),
            None => Ok(state.read(command)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_then_read_back() {
        let (mut mock, handle) = MockInstrument::new();
        let t = Duration::from_millis(100);
        let ack = mock.query("/dev2086/sigouts/0/offset 0.25", t).await.unwrap();
        assert_eq!(ack, "0.25");
        let read = mock.query("/dev2086/sigouts/0/offset", t).await.unwrap();
        assert_eq!(read, "0.25");
        assert_eq!(handle.log().await.len(), 2);
    }

    #[tokio::test]
    async fn test_unwritten_node_reads_zero() {
        let (mut mock, _handle) = MockInstrument::new();
        let read = mock
            .query("/dev2086/oscs/0/freq", Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(read, "0");
    }

    #[tokio::test]
    async fn test_vector_node_accumulates() {
        let (mut mock, handle) = MockInstrument::new();
        handle.mark_vector("/dev2086/awgs/0/waveform/data").await;
        let t = Duration::from_millis(100);
        mock.query("/dev2086/awgs/0/waveform/data 0,0.5", t).await.unwrap();
        mock.query("/dev2086/awgs/0/waveform/data -0.5,1", t).await.unwrap();
        assert_eq!(
            handle.node("/dev2086/awgs/0/waveform/data").await.as_deref(),
            Some("0,0.5,-0.5,1")
        );
    }

    #[tokio::test]
    async fn test_faults_consumed_in_order() {
        let (mut mock, handle) = MockInstrument::new();
        handle.timeout_next(1).await;
        let t = Duration::from_millis(100);
        let err = mock.query("/x", t).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
        assert!(mock.query("/x", t).await.is_ok());
    }

    #[tokio::test]
    async fn test_delayed_data_drains_per_poll() {
        let (mut mock, handle) = MockInstrument::new();
        handle.set_node("/trace", "0.1,0.2").await;
        handle.delay_data("/trace", 2).await;
        let t = Duration::from_millis(100);
        assert_eq!(mock.query("/trace", t).await.unwrap(), "");
        assert_eq!(mock.query("/trace", t).await.unwrap(), "");
        assert_eq!(mock.query("/trace", t).await.unwrap(), "0.1,0.2");
    }
}
