//! Runtime values for catalog quantities.
//!
//! The catalog's value space is closed: a quantity holds a double, a
//! boolean, a string, or an ordered sample vector. Representing this as a
//! tagged enum (rather than stringly-typed payloads) means every consumer
//! match is exhaustively checked, and device-literal rendering lives in one
//! place.

use serde::{Deserialize, Serialize};

/// A runtime value held by, or destined for, a catalog quantity.
///
/// BUTTON quantities carry no value at all and therefore have no variant
/// here; pressing a button is an operation, not a state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Boolean state (output on/off, coupling AC/DC, ...).
    Bool(bool),
    /// Scalar double (offsets, amplitudes, thresholds, frequencies).
    Double(f64),
    /// Free-form string (labels, serial numbers).
    Str(String),
    /// Ordered sample vector (waveforms, traces).
    Vector(Vec<f64>),
}

impl Value {
    /// Scalar view. Booleans coerce to 0.0/1.0, matching the instrument's
    /// integer-node convention.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Double(v) => Some(*v),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    /// Boolean view. Doubles equal to exactly 0.0 or 1.0 are accepted as
    /// their boolean equivalents; anything else is not a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Double(v) if *v == 0.0 => Some(false),
            Value::Double(v) if *v == 1.0 => Some(true),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_vector(&self) -> Option<&[f64]> {
        match self {
            Value::Vector(v) => Some(v),
            _ => None,
        }
    }

    /// Canonical textual rendering in the instrument's expected literal
    /// form: booleans as `0`/`1`, doubles as shortest round-trip decimals,
    /// vectors as comma-separated samples.
    pub fn render(&self) -> String {
        match self {
            Value::Bool(b) => if *b { "1" } else { "0" }.to_string(),
            Value::Double(v) => format_f64(*v),
            Value::Str(s) => s.clone(),
            Value::Vector(v) => render_samples(v),
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<Vec<f64>> for Value {
    fn from(v: Vec<f64>) -> Self {
        Value::Vector(v)
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Vector(v) => write!(f, "vector[{}]", v.len()),
            other => write!(f, "{}", other.render()),
        }
    }
}

/// Shortest round-trip decimal for a double.
///
/// `{}` on f64 already produces the shortest representation that parses
/// back to the same bits; the only fixups needed are the non-finite cases,
/// which a device literal cannot carry.
fn format_f64(v: f64) -> String {
    if v.is_finite() {
        format!("{}", v)
    } else if v.is_nan() {
        "nan".to_string()
    } else if v > 0.0 {
        "inf".to_string()
    } else {
        "-inf".to_string()
    }
}

/// Comma-separated sample rendering used for vector payload chunks.
pub fn render_samples(samples: &[f64]) -> String {
    let mut out = String::with_capacity(samples.len() * 8);
    for (i, s) in samples.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&format_f64(*s));
    }
    out
}

/// Parse a comma-separated sample payload back into a vector.
///
/// The empty string parses to an empty vector, the wire form of "no data
/// yet" during an acquisition poll.
pub fn parse_samples(payload: &str) -> Option<Vec<f64>> {
    let trimmed = payload.trim();
    if trimmed.is_empty() {
        return Some(Vec::new());
    }
    trimmed
        .split(',')
        .map(|tok| tok.trim().parse::<f64>().ok())
        .collect()
}
