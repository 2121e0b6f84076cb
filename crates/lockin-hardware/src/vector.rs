//! Bulk sample transfer: chunked waveform upload and polled trace download.
//!
//! Uploads split the sample stream at a configured chunk size and send the
//! chunks strictly in order, each acknowledged with a query round-trip
//! before the next leaves. Any failure aborts the upload; the waveform state
//! on the instrument is then undefined and the caller resends the whole
//! vector. Downloads poll the trace node until it reports data or the
//! caller deadline expires. Sample order is preserved exactly both ways.

use std::time::Duration;

use lockin_core::{limits, value, EngineError, Transport};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::settings::RejectMatcher;

/// AWG playback rate: the 1.8 GS/s base clock divided by a power of two.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackRate {
    Full,
    Div2,
    Div4,
    Div8,
    Div16,
    Div32,
    Div64,
    Div128,
    Div256,
    Div512,
    Div1024,
    Div2048,
    Div4096,
    Div8192,
}

impl PlaybackRate {
    /// Base sample clock in hertz.
    pub const BASE_HZ: f64 = 1.8e9;

    pub const ALL: [PlaybackRate; 14] = [
        PlaybackRate::Full,
        PlaybackRate::Div2,
        PlaybackRate::Div4,
        PlaybackRate::Div8,
        PlaybackRate::Div16,
        PlaybackRate::Div32,
        PlaybackRate::Div64,
        PlaybackRate::Div128,
        PlaybackRate::Div256,
        PlaybackRate::Div512,
        PlaybackRate::Div1024,
        PlaybackRate::Div2048,
        PlaybackRate::Div4096,
        PlaybackRate::Div8192,
    ];

    /// Divider exponent n, rate = base / 2^n.
    pub fn exponent(self) -> u8 {
        self as u8
    }

    /// Device code for the sampling-rate node.
    pub fn code(self) -> u8 {
        self.exponent()
    }

    pub fn from_exponent(n: u8) -> Option<Self> {
        Self::ALL.get(usize::from(n)).copied()
    }

    /// Effective sample rate in hertz.
    pub fn hertz(self) -> f64 {
        Self::BASE_HZ / f64::from(1_u32 << self.exponent())
    }

    /// Sample period in seconds.
    pub fn dt(self) -> f64 {
        1.0 / self.hertz()
    }
}

/// A downloaded trace with its x-axis tags from the catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct Trace {
    pub samples: Vec<f64>,
    pub x_name: Option<String>,
    pub x_unit: Option<String>,
}

/// Send one waveform as ordered, acknowledged chunks.
///
/// `base_command` is the fully formatted write path for the vector
/// quantity; each chunk is appended to it in the wire form. The rate is set
/// separately before this runs.
pub(crate) async fn upload_chunks<T: Transport + ?Sized>(
    transport: &mut T,
    base_command: &str,
    samples: &[f64],
    chunk_samples: usize,
    timeout: Duration,
    reject: &RejectMatcher,
) -> Result<(), EngineError> {
    limits::validate_vector_len(samples.len())?;
    limits::validate_chunk_len(chunk_samples)?;

    let total = samples.len().div_ceil(chunk_samples);
    for (index, chunk) in samples.chunks(chunk_samples).enumerate() {
        let command = format!("{base_command} {}", value::render_samples(chunk));
        debug!(chunk = index + 1, total, samples = chunk.len(), "uploading chunk");
        let response = transport
            .query(&command, timeout)
            .await
            .map_err(|e| abort(index, total, EngineError::from_io(&command, e)))?;
        reject
            .check(&command, &response)
            .map_err(|e| abort(index, total, e))?;
    }
    Ok(())
}

fn abort(index: usize, total: usize, err: EngineError) -> EngineError {
    warn!(chunk = index + 1, total, %err, "upload aborted, waveform state undefined");
    err
}

/// Poll a trace node until it reports samples or the deadline passes.
///
/// An empty payload means the acquisition has not completed yet; anything
/// unparsable is a protocol fault. Transport faults are not retried here,
/// the poll loop itself is the retry.
pub(crate) async fn poll_samples<T: Transport + ?Sized>(
    transport: &mut T,
    command: &str,
    timeout: Duration,
    poll_interval: Duration,
    deadline: Instant,
    reject: &RejectMatcher,
) -> Result<Vec<f64>, EngineError> {
    loop {
        let response = transport
            .query(command, timeout)
            .await
            .map_err(|e| EngineError::from_io(command, e))?;
        reject.check(command, &response)?;
        if response.len() > limits::MAX_RESPONSE_SIZE {
            return Err(EngineError::LimitExceeded {
                context: "trace response size",
                actual: response.len(),
                max: limits::MAX_RESPONSE_SIZE,
            });
        }
        let samples = value::parse_samples(&response).ok_or_else(|| EngineError::BadResponse {
            command: command.to_string(),
            response,
        })?;
        if !samples.is_empty() {
            return Ok(samples);
        }
        if Instant::now() + poll_interval > deadline {
            return Err(EngineError::TransportTimeout {
                command: command.to_string(),
            });
        }
        tokio::time::sleep(poll_interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_table_spans_fourteen_dividers() {
        assert_eq!(PlaybackRate::ALL.len(), 14);
        assert_eq!(PlaybackRate::Full.hertz(), 1.8e9);
        assert_eq!(PlaybackRate::Div2.hertz(), 0.9e9);
        assert_eq!(PlaybackRate::Div8192.exponent(), 13);
        assert_eq!(PlaybackRate::Div8192.hertz(), 1.8e9 / 8192.0);
        assert!(PlaybackRate::from_exponent(14).is_none());
        assert_eq!(PlaybackRate::from_exponent(3), Some(PlaybackRate::Div8));
    }

    #[test]
    fn test_dt_is_reciprocal() {
        for rate in PlaybackRate::ALL {
            let product = rate.dt() * rate.hertz();
            assert!((product - 1.0).abs() < 1e-12);
        }
    }
}
