//! Error types for the catalog engine.
//!
//! Two taxonomies live here, with a hard line between them:
//!
//! - [`CatalogError`]: fatal, load-time. A catalog that violates an invariant
//!   (duplicate name, malformed combo, cyclic visibility dependency, inverted
//!   bounds) aborts engine construction entirely; the engine never runs
//!   against an inconsistent catalog.
//! - [`EngineError`]: per-request. Local validation errors (unknown quantity,
//!   out-of-range value, hidden control) are resolved before any device I/O
//!   is attempted, so a request that fails validation leaves the instrument
//!   untouched. Remote errors carry the exact command string that failed, so
//!   a failure can be diagnosed without access to an instrument log.

use thiserror::Error;

/// Convenience alias for results using the engine error type.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Fatal catalog violations detected at load time.
///
/// Any of these aborts initialization; there is no partial catalog.
#[derive(Error, Debug)]
pub enum CatalogError {
    /// Two sections share a quantity name. Names are the stable lookup key.
    #[error("duplicate quantity name '{0}'")]
    DuplicateName(String),

    /// A COMBO quantity declares no options, so label->code cannot be total.
    #[error("quantity '{0}' is a COMBO but declares no combo options")]
    EmptyCombo(String),

    /// `state_quant` names a quantity that does not exist in the catalog.
    #[error("quantity '{name}' depends on unknown quantity '{target}'")]
    UnknownDependency { name: String, target: String },

    /// A visibility dependency declares no permitted states.
    #[error("quantity '{0}' declares a state dependency with no states")]
    EmptyStates(String),

    /// The visibility dependency graph contains a cycle.
    #[error("visibility dependency cycle through quantity '{0}'")]
    DependencyCycle(String),

    /// `low_lim` exceeds `high_lim` with both finite.
    #[error("quantity '{name}' has inverted limits: low {low} > high {high}")]
    InvalidBounds { name: String, low: f64, high: f64 },

    /// A command template uses a placeholder the formatter cannot supply,
    /// or otherwise fails to render.
    #[error("quantity '{name}' has a bad command template '{template}': {detail}")]
    Template {
        name: String,
        template: String,
        detail: String,
    },

    /// The catalog file could not be read.
    #[error("failed to read catalog {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The catalog text is not valid YAML for the expected schema.
    #[error("failed to parse catalog: {0}")]
    Parse(String),
}

/// Primary per-request error type for the dispatch engine.
///
/// Local (caller) errors are produced before any device I/O; remote errors
/// are produced after, and name the command that was on the wire.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Catalog loading or validation failed (fatal at construction).
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// The requested quantity name is not in the catalog.
    #[error("unknown quantity '{0}'")]
    UnknownQuantity(String),

    /// A COMBO label or device code is not among the declared options.
    #[error("quantity '{quantity}' has no combo entry '{value}'")]
    UnknownComboValue { quantity: String, value: String },

    /// A DOUBLE value falls strictly outside `[low_lim, high_lim]`.
    #[error("value {value} for '{quantity}' is outside [{low}, {high}]")]
    OutOfRange {
        quantity: String,
        value: f64,
        low: f64,
        high: f64,
    },

    /// The supplied value does not fit the quantity's datatype.
    #[error("value for '{quantity}' does not match datatype {datatype}")]
    TypeMismatch { quantity: String, datatype: String },

    /// The quantity is currently hidden by another quantity's state.
    ///
    /// Distinct from [`EngineError::OutOfRange`]: visibility gates
    /// availability, not validity. A value may be in range and still be
    /// refused because its control is disabled by the controller's state.
    #[error("'{quantity}' is not active while '{controller}' is {current}")]
    NotVisible {
        quantity: String,
        controller: String,
        current: String,
    },

    /// Sweep was requested on a quantity that declares no `sweep_cmd`.
    #[error("quantity '{0}' does not support sweeping")]
    SweepUnsupported(String),

    /// The operation is refused by the quantity's declared permission.
    #[error("operation not permitted on '{quantity}' (permission {permission})")]
    PermissionDenied { quantity: String, permission: String },

    /// An upload required samples but the vector was empty.
    #[error("empty sample vector for '{0}'")]
    EmptyVector(String),

    /// The device answered, but the response does not parse as the
    /// quantity's datatype.
    #[error("malformed response '{response}' to command '{command}'")]
    BadResponse { command: String, response: String },

    /// The device reported a semantic error. Never retried.
    #[error("device rejected command '{command}': {response}")]
    DeviceRejected { command: String, response: String },

    /// The transport round-trip exceeded its deadline (after bounded
    /// retries).
    #[error("timed out waiting for response to '{command}'")]
    TransportTimeout { command: String },

    /// The transport failed with an I/O error (after bounded retries).
    #[error("transport failure on '{command}': {source}")]
    Transport {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// A payload exceeded a shared hard limit.
    #[error("{context} of {actual} exceeds maximum {max}")]
    LimitExceeded {
        context: &'static str,
        actual: usize,
        max: usize,
    },
}

impl EngineError {
    /// Classify a transport I/O failure for a given command. Timeouts get
    /// their own variant so retry accounting can distinguish them.
    pub fn from_io(command: &str, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::TimedOut {
            EngineError::TransportTimeout {
                command: command.to_string(),
            }
        } else {
            EngineError::Transport {
                command: command.to_string(),
                source,
            }
        }
    }

    /// True for transport-level faults that the engine retries with backoff.
    ///
    /// Device-reported semantic errors are deliberately excluded: the
    /// instrument understood and refused the command, so resending it
    /// cannot succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EngineError::TransportTimeout { .. } | EngineError::Transport { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_names_command() {
        let err = EngineError::DeviceRejected {
            command: "/dev2086/sigouts/0/range 2.0".into(),
            response: "ERR: out of hardware range".into(),
        };
        assert!(err.to_string().contains("/dev2086/sigouts/0/range 2.0"));
    }

    #[test]
    fn test_transient_classification() {
        let timeout = EngineError::TransportTimeout {
            command: "/dev/x".into(),
        };
        assert!(timeout.is_transient());

        let rejected = EngineError::DeviceRejected {
            command: "/dev/x".into(),
            response: "ERR".into(),
        };
        assert!(!rejected.is_transient());

        let local = EngineError::UnknownQuantity("Nope".into());
        assert!(!local.is_transient());
    }

    #[test]
    fn test_catalog_error_display() {
        let err = CatalogError::InvalidBounds {
            name: "OffsetSigOut1".into(),
            low: 1.0,
            high: -1.0,
        };
        assert!(err.to_string().contains("inverted limits"));
    }
}
