//! Label <-> device-code translation for COMBO quantities.
//!
//! The mapping is built once per quantity at catalog load and is closed
//! thereafter: every translation is a lookup into the validated option
//! list, never an ad hoc string comparison against raw catalog text.

use crate::catalog::schema::ComboEntry;
use lockin_core::EngineError;

/// Per-quantity translation table, in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct ComboMap {
    options: Vec<ComboEntry>,
}

impl ComboMap {
    pub(crate) fn new(options: Vec<ComboEntry>) -> Self {
        Self { options }
    }

    /// Display label -> device code.
    pub fn encode(&self, quantity: &str, label: &str) -> Result<&str, EngineError> {
        self.options
            .iter()
            .find(|opt| opt.label == label)
            .map(|opt| opt.code.as_str())
            .ok_or_else(|| EngineError::UnknownComboValue {
                quantity: quantity.to_string(),
                value: label.to_string(),
            })
    }

    /// Device code -> display label.
    ///
    /// Codes need not be unique across entries in degenerate catalogs;
    /// ties resolve to the first match in declaration order.
    pub fn decode(&self, quantity: &str, code: &str) -> Result<&str, EngineError> {
        self.options
            .iter()
            .find(|opt| opt.code == code)
            .map(|opt| opt.label.as_str())
            .ok_or_else(|| EngineError::UnknownComboValue {
                quantity: quantity.to_string(),
                value: code.to_string(),
            })
    }

    /// Declared labels in canonical order.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.options.iter().map(|opt| opt.label.as_str())
    }

    pub fn len(&self) -> usize {
        self.options.len()
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }
}
