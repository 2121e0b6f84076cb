//! Conditional visibility over the catalog dependency graph.
//!
//! A quantity with a `state_quant` is active only while its controller holds
//! one of the declared `states`, and the controller itself is active. Load
//! time guarantees the graph is acyclic, so one bottom-up walk along the
//! controller chain settles the question.

use std::collections::HashMap;

use lockin_core::Value;

use crate::catalog::{Catalog, Quantity};

/// Snapshot of current quantity values, keyed by name. Controllers missing
/// from the snapshot count as inactive; the engine fetches controller values
/// before asking.
pub type ValueSnapshot = HashMap<String, Value>;

/// Whether a quantity is currently active given a value snapshot.
pub fn is_active(catalog: &Catalog, quantity: &Quantity, values: &ValueSnapshot) -> bool {
    let mut current = quantity;
    while let Some(dep) = current.dependency() {
        let controller = catalog.at(dep.controller);
        let Some(held) = values.get(controller.name()) else {
            return false;
        };
        if !dep.states.iter().any(|wanted| state_matches(held, wanted)) {
            return false;
        }
        current = controller;
    }
    true
}

/// Collect the controller chain of a quantity, nearest first. The engine
/// resolves each of these to a value before the visibility check.
pub fn controller_chain<'a>(catalog: &'a Catalog, quantity: &'a Quantity) -> Vec<&'a Quantity> {
    let mut chain = Vec::new();
    let mut current = quantity;
    while let Some(dep) = current.dependency() {
        let controller = catalog.at(dep.controller);
        chain.push(controller);
        current = controller;
    }
    chain
}

/// Loose state comparison. Catalogs declare states in whatever literal form
/// reads best (`true`, `1`, a combo label); held values arrive in the typed
/// form the engine cached. Booleans and numeric 0/1 are interchangeable,
/// doubles compare exactly, strings compare exactly.
pub(crate) fn state_matches(held: &Value, wanted: &Value) -> bool {
    match (held, wanted) {
        (Value::Str(a), Value::Str(b)) => a == b,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Double(a), Value::Double(b)) => a == b,
        (Value::Bool(b), Value::Double(d)) | (Value::Double(d), Value::Bool(b)) => {
            (*d == 1.0 && *b) || (*d == 0.0 && !*b)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::schema::{Datatype, InstrumentMeta, QuantityDef};

    fn catalog() -> Catalog {
        let meta = InstrumentMeta {
            model: "UHFQA".into(),
            default_address: None,
            version: None,
        };
        let switch = QuantityDef::new(Datatype::Boolean);
        let mut child = QuantityDef::new(Datatype::Double);
        child.state_quant = Some("ExtRef".into());
        child.states = vec![Value::Bool(true)];
        let mut grandchild = QuantityDef::new(Datatype::Double);
        grandchild.state_quant = Some("RefFrequency".into());
        grandchild.states = vec![Value::Double(10e6)];
        Catalog::from_entries(
            meta,
            vec![
                ("ExtRef".into(), switch),
                ("RefFrequency".into(), child),
                ("RefPhase".into(), grandchild),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_root_always_active() {
        let catalog = catalog();
        let q = catalog.lookup("ExtRef").unwrap();
        assert!(is_active(&catalog, q, &ValueSnapshot::new()));
    }

    #[test]
    fn test_toggle_via_controller() {
        let catalog = catalog();
        let q = catalog.lookup("RefFrequency").unwrap();
        let mut values = ValueSnapshot::new();
        assert!(!is_active(&catalog, q, &values));
        values.insert("ExtRef".into(), Value::Bool(true));
        assert!(is_active(&catalog, q, &values));
        values.insert("ExtRef".into(), Value::Bool(false));
        assert!(!is_active(&catalog, q, &values));
    }

    #[test]
    fn test_numeric_bool_interchange() {
        let catalog = catalog();
        let q = catalog.lookup("RefFrequency").unwrap();
        let mut values = ValueSnapshot::new();
        values.insert("ExtRef".into(), Value::Double(1.0));
        assert!(is_active(&catalog, q, &values));
        values.insert("ExtRef".into(), Value::Double(0.0));
        assert!(!is_active(&catalog, q, &values));
    }

    #[test]
    fn test_chain_requires_every_level() {
        let catalog = catalog();
        let q = catalog.lookup("RefPhase").unwrap();
        let mut values = ValueSnapshot::new();
        values.insert("RefFrequency".into(), Value::Double(10e6));
        // Direct controller matches but its own controller is off.
        values.insert("ExtRef".into(), Value::Bool(false));
        assert!(!is_active(&catalog, q, &values));
        values.insert("ExtRef".into(), Value::Bool(true));
        assert!(is_active(&catalog, q, &values));
    }

    #[test]
    fn test_controller_chain_order() {
        let catalog = catalog();
        let q = catalog.lookup("RefPhase").unwrap();
        let chain: Vec<&str> = controller_chain(&catalog, q)
            .into_iter()
            .map(Quantity::name)
            .collect();
        assert_eq!(chain, vec!["RefFrequency", "ExtRef"]);
    }
}
