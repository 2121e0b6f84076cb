//! Umbrella crate for the lock-in instrument catalog engine.
//!
//! Re-exports the core primitives and the hardware layer so downstream
//! users depend on one crate.

pub use lockin_core as core;
pub use lockin_hardware as hardware;

pub use lockin_core::{CatalogError, EngineError, Transport, Value};
pub use lockin_hardware::{
    Catalog, DispatchEngine, EngineSettings, MockHandle, MockInstrument, PlaybackRate, Trace,
};
