//! `lockin-core`
//!
//! Core types and traits for the catalog-driven instrument engine.
//!
//! This crate provides the building blocks shared by the engine and any
//! transport implementation:
//!
//! - [`error::EngineError`]: per-request error taxonomy
//! - [`error::CatalogError`]: fatal load-time catalog violations
//! - [`value::Value`]: the closed set of runtime value variants
//! - [`transport::Transport`]: the request/response text boundary to a device
//! - [`limits`]: shared hard limits for payload and chunk sizes

pub mod error;
pub mod limits;
pub mod transport;
pub mod value;

pub use error::{CatalogError, EngineError, Result};
pub use transport::Transport;
pub use value::Value;
