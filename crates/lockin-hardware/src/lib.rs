//! Catalog-driven instrument control for a lock-in/quantum-analysis
//! instrument.
//!
//! A YAML quantity catalog declares everything the engine knows about the
//! device: typed quantities with bounds and permissions, combo translation
//! tables, visibility dependencies, and the command templates that map each
//! quantity onto hierarchical device paths. The [`engine::DispatchEngine`]
//! interprets that catalog over any [`lockin_core::Transport`], serializing
//! device I/O and caching acknowledged state.

pub mod catalog;
pub mod combo;
pub mod engine;
pub mod format;
pub mod mock;
pub mod settings;
pub mod validate;
pub mod vector;
pub mod visibility;

pub use catalog::schema::{Datatype, InstrumentMeta, Permission, QuantityDef};
pub use catalog::{Catalog, Quantity};
pub use combo::ComboMap;
pub use engine::DispatchEngine;
pub use mock::{MockHandle, MockInstrument};
pub use settings::EngineSettings;
pub use vector::{PlaybackRate, Trace};
