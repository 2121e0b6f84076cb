//! YAML schema types for the instrument quantity catalog.
//!
//! The catalog file has an `instrument` header and a `quantities` mapping
//! keyed by quantity name. Declaration order is significant (it drives UI
//! ordering and the canonical iteration order for validation), so the
//! mapping deserializes into an [`IndexMap`].
//!
//! # Example catalog
//!
//! ```yaml
//! instrument:
//!   model: UHFQA
//!   default_address: dev2086
//!
//! quantities:
//!   SigOut1On:
//!     label: "Signal Output 1 - On"
//!     datatype: BOOLEAN
//!     group: "Signal Outputs"
//!     section: "In / Out"
//!     get_cmd: "/{dev}/sigouts/0/on"
//!   RangeSigOut1:
//!     datatype: COMBO
//!     combos:
//!       - { label: "75 mV",  code: "0.075" }
//!       - { label: "750 mV", code: "0.75" }
//!     get_cmd: "/{dev}/sigouts/0/range"
//! ```

use indexmap::IndexMap;
use lockin_core::Value;
use serde::{Deserialize, Serialize};

/// Top-level structure of a catalog file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogFile {
    pub instrument: InstrumentMeta,

    /// Quantity sections keyed by unique quantity name, declaration order
    /// preserved.
    pub quantities: IndexMap<String, QuantityDef>,
}

/// Instrument header of a catalog file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentMeta {
    /// Instrument model this catalog describes (e.g. "UHFQA").
    pub model: String,

    /// Address used when the caller does not supply one (e.g. "dev2086").
    #[serde(default)]
    pub default_address: Option<String>,

    /// Catalog revision, free-form.
    #[serde(default)]
    pub version: Option<String>,
}

/// One quantity section as declared in the catalog.
///
/// Presentation keys (`label`, `group`, `section`, `tooltip`, `unit`) have
/// no behavioral effect. Command templates carry a `{dev}` placeholder for
/// the instrument address; set and sweep templates may also carry `{value}`
/// and `{rate}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantityDef {
    #[serde(default)]
    pub label: Option<String>,

    #[serde(default)]
    pub group: Option<String>,

    #[serde(default)]
    pub section: Option<String>,

    #[serde(default)]
    pub tooltip: Option<String>,

    pub datatype: Datatype,

    #[serde(default)]
    pub unit: Option<String>,

    #[serde(default)]
    pub permission: Permission,

    /// Disabled quantities refuse set/sweep like hidden ones.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Lower bound for DOUBLE quantities. Ignored by VECTOR and BUTTON.
    #[serde(default = "neg_infinity")]
    pub low_lim: f64,

    /// Upper bound for DOUBLE quantities. Ignored by VECTOR and BUTTON.
    #[serde(default = "pos_infinity")]
    pub high_lim: f64,

    /// Query template. Doubles as the set template when `set_cmd` is
    /// absent (query-style addressing where read and write share a path).
    #[serde(default)]
    pub get_cmd: Option<String>,

    #[serde(default)]
    pub set_cmd: Option<String>,

    #[serde(default)]
    pub sweep_cmd: Option<String>,

    #[serde(default)]
    pub stop_cmd: Option<String>,

    /// Playback-rate template for VECTOR quantities, written before an
    /// upload. Carries `{dev}` and `{rate}` placeholders.
    #[serde(default)]
    pub rate_cmd: Option<String>,

    /// Ordered label/code pairs for COMBO quantities. Order is canonical.
    #[serde(default)]
    pub combos: Vec<ComboEntry>,

    /// Name of the controlling quantity for visibility, if any.
    #[serde(default)]
    pub state_quant: Option<String>,

    /// Controller values under which this quantity is active.
    #[serde(default)]
    pub states: Vec<Value>,

    /// X-axis name for VECTOR quantities.
    #[serde(default)]
    pub x_name: Option<String>,

    /// X-axis unit for VECTOR quantities.
    #[serde(default)]
    pub x_unit: Option<String>,

    /// Whether a VECTOR quantity appears in result listings.
    #[serde(default)]
    pub show_in_results: bool,
}

/// One display-label / device-code pair of a COMBO quantity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComboEntry {
    pub label: String,
    pub code: String,
}

/// The closed set of quantity datatypes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Datatype {
    Double,
    Boolean,
    Combo,
    String,
    Vector,
    Button,
}

impl std::fmt::Display for Datatype {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Datatype::Double => "DOUBLE",
            Datatype::Boolean => "BOOLEAN",
            Datatype::Combo => "COMBO",
            Datatype::String => "STRING",
            Datatype::Vector => "VECTOR",
            Datatype::Button => "BUTTON",
        };
        write!(f, "{}", label)
    }
}

/// Read/write permission of a quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Permission {
    /// Readable and writable (the default).
    #[default]
    Both,
    /// Device-readable only; sets are refused locally.
    Read,
    /// Device-writable only; gets are served from the cache, a cold
    /// device read is refused locally.
    Write,
    /// No device communication; a pure software quantity.
    None,
}

impl Permission {
    pub fn allows_set(self) -> bool {
        matches!(self, Permission::Both | Permission::Write)
    }

    pub fn allows_device_get(self) -> bool {
        matches!(self, Permission::Both | Permission::Read)
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Permission::Both => "BOTH",
            Permission::Read => "READ",
            Permission::Write => "WRITE",
            Permission::None => "NONE",
        };
        write!(f, "{}", label)
    }
}

fn default_enabled() -> bool {
    true
}

fn neg_infinity() -> f64 {
    f64::NEG_INFINITY
}

fn pos_infinity() -> f64 {
    f64::INFINITY
}

impl QuantityDef {
    /// Minimal definition used by tests and programmatic construction.
    pub fn new(datatype: Datatype) -> Self {
        Self {
            label: None,
            group: None,
            section: None,
            tooltip: None,
            datatype,
            unit: None,
            permission: Permission::default(),
            enabled: true,
            low_lim: f64::NEG_INFINITY,
            high_lim: f64::INFINITY,
            get_cmd: None,
            set_cmd: None,
            sweep_cmd: None,
            stop_cmd: None,
            rate_cmd: None,
            combos: Vec::new(),
            state_quant: None,
            states: Vec::new(),
            x_name: None,
            x_unit: None,
            show_in_results: false,
        }
    }
}
