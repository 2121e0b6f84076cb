//! Shared hard limits to prevent unbounded allocations or payload growth.
//!
//! Centralized so the engine, the vector transfer path, and any transport
//! implementation agree on the same ceilings.

use crate::error::EngineError;

/// Maximum allowed response payload in bytes (default: 1MB).
pub const MAX_RESPONSE_SIZE: usize = 1024 * 1024;

/// Maximum samples per upload chunk.
///
/// One chunk must render to a command comfortably below
/// [`MAX_RESPONSE_SIZE`]; at worst ~25 bytes per rendered sample this caps
/// a chunk command near 400 KiB.
pub const MAX_CHUNK_SAMPLES: usize = 16_384;

/// Maximum total samples in a single uploaded waveform (default: 64M).
pub const MAX_VECTOR_SAMPLES: usize = 64 * 1024 * 1024;

/// Validate a configured chunk size against the shared ceiling.
pub fn validate_chunk_len(chunk_samples: usize) -> Result<usize, EngineError> {
    if chunk_samples == 0 {
        return Err(EngineError::LimitExceeded {
            context: "chunk size",
            actual: 0,
            max: MAX_CHUNK_SAMPLES,
        });
    }
    if chunk_samples > MAX_CHUNK_SAMPLES {
        return Err(EngineError::LimitExceeded {
            context: "chunk size",
            actual: chunk_samples,
            max: MAX_CHUNK_SAMPLES,
        });
    }
    Ok(chunk_samples)
}

/// Validate a waveform length before upload.
pub fn validate_vector_len(samples: usize) -> Result<usize, EngineError> {
    if samples > MAX_VECTOR_SAMPLES {
        return Err(EngineError::LimitExceeded {
            context: "waveform length",
            actual: samples,
            max: MAX_VECTOR_SAMPLES,
        });
    }
    Ok(samples)
}
