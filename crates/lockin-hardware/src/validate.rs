//! Range and type validation, purely local.
//!
//! Every check here resolves before any device I/O. Combo label membership
//! is the translator's business; this module only settles type shape and
//! numeric bounds.

use lockin_core::{EngineError, Value};

use crate::catalog::schema::Datatype;
use crate::catalog::Quantity;

/// Validate a value against a quantity's datatype and bounds.
pub fn validate(quantity: &Quantity, value: &Value) -> Result<(), EngineError> {
    let def = quantity.def();
    match def.datatype {
        Datatype::Double => {
            let v = value.as_f64().ok_or_else(|| mismatch(quantity))?;
            // Bounds are inclusive; defaults of ±∞ admit every finite
            // value. NaN and infinities never reach the wire.
            if !v.is_finite() || v < def.low_lim || v > def.high_lim {
                return Err(EngineError::OutOfRange {
                    quantity: quantity.name().to_string(),
                    value: v,
                    low: def.low_lim,
                    high: def.high_lim,
                });
            }
            Ok(())
        }
        Datatype::Boolean => {
            // bool or numeric 0/1, anything else is a type error.
            value.as_bool().map(|_| ()).ok_or_else(|| mismatch(quantity))
        }
        Datatype::Combo | Datatype::String => match value {
            Value::Str(_) => Ok(()),
            _ => Err(mismatch(quantity)),
        },
        // A press carries no payload worth checking.
        Datatype::Button => Ok(()),
        Datatype::Vector => match value {
            // Empty means clear, legal at this layer; operations that need
            // samples reject it themselves.
            Value::Vector(_) => Ok(()),
            _ => Err(mismatch(quantity)),
        },
    }
}

/// Validate a vector payload for an operation that requires samples.
pub fn validate_nonempty_vector(quantity: &Quantity, samples: &[f64]) -> Result<(), EngineError> {
    if samples.is_empty() {
        return Err(EngineError::EmptyVector(quantity.name().to_string()));
    }
    Ok(())
}

fn mismatch(quantity: &Quantity) -> EngineError {
    EngineError::TypeMismatch {
        quantity: quantity.name().to_string(),
        datatype: quantity.datatype().to_string(),
    }
}
