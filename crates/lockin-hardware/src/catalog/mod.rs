//! The immutable quantity catalog.
//!
//! Loading follows the same pipeline as any declarative device definition:
//! read, deserialize, then validate-or-fatal. Every invariant violation is
//! a [`CatalogError`] that aborts initialization; the engine never runs
//! against an inconsistent catalog. After construction the catalog is
//! read-only and shared by reference.

pub mod schema;

use std::collections::HashMap;
use std::path::Path;

use lockin_core::{CatalogError, EngineError, Value};
use tracing::info;

use crate::combo::ComboMap;
use schema::{CatalogFile, Datatype, InstrumentMeta, QuantityDef};

/// Resolved visibility dependency: this quantity is active only while the
/// controller quantity holds one of the permitted values.
#[derive(Debug, Clone)]
pub struct StateDependency {
    /// Catalog index of the controlling quantity.
    pub controller: usize,
    /// Controller values under which the dependent is active.
    pub states: Vec<Value>,
}

/// One validated catalog quantity.
#[derive(Debug, Clone)]
pub struct Quantity {
    name: String,
    def: QuantityDef,
    combo: Option<ComboMap>,
    dep: Option<StateDependency>,
    index: usize,
}

impl Quantity {
    /// Stable unique key.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Display label; falls back to the name.
    pub fn label(&self) -> &str {
        self.def.label.as_deref().unwrap_or(&self.name)
    }

    pub fn def(&self) -> &QuantityDef {
        &self.def
    }

    pub fn datatype(&self) -> Datatype {
        self.def.datatype
    }

    /// Translation table, present exactly for COMBO quantities.
    pub fn combo(&self) -> Option<&ComboMap> {
        self.combo.as_ref()
    }

    /// Resolved visibility dependency, if declared.
    pub fn dependency(&self) -> Option<&StateDependency> {
        self.dep.as_ref()
    }

    /// Position in declaration order.
    pub fn index(&self) -> usize {
        self.index
    }
}

/// The loaded, validated, immutable definition set.
#[derive(Debug, Clone)]
pub struct Catalog {
    instrument: InstrumentMeta,
    quantities: Vec<Quantity>,
    by_name: HashMap<String, usize>,
}

impl Catalog {
    /// Load and validate a catalog from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self, CatalogError> {
        let text = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let catalog = Self::from_yaml(&text)?;
        info!(
            model = %catalog.instrument.model,
            quantities = catalog.quantities.len(),
            "loaded catalog from {}",
            path.display()
        );
        Ok(catalog)
    }

    /// Load and validate a catalog from YAML text.
    pub fn from_yaml(text: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile =
            serde_yaml::from_str(text).map_err(|e| CatalogError::Parse(e.to_string()))?;
        Self::from_entries(file.instrument, file.quantities.into_iter().collect())
    }

    /// Build and validate a catalog from explicit entries, declaration
    /// order preserved. This is the single construction path; every
    /// invariant is enforced here.
    pub fn from_entries(
        instrument: InstrumentMeta,
        entries: Vec<(String, QuantityDef)>,
    ) -> Result<Self, CatalogError> {
        let mut by_name: HashMap<String, usize> = HashMap::with_capacity(entries.len());
        let mut quantities: Vec<Quantity> = Vec::with_capacity(entries.len());

        for (index, (name, def)) in entries.into_iter().enumerate() {
            if by_name.insert(name.clone(), index).is_some() {
                return Err(CatalogError::DuplicateName(name));
            }

            let combo = match def.datatype {
                Datatype::Combo => {
                    if def.combos.is_empty() {
                        return Err(CatalogError::EmptyCombo(name));
                    }
                    Some(ComboMap::new(def.combos.clone()))
                }
                // VECTOR and BUTTON (and scalars) ignore combo options.
                _ => None,
            };

            if def.datatype == Datatype::Double
                && def.low_lim.is_finite()
                && def.high_lim.is_finite()
                && def.low_lim > def.high_lim
            {
                return Err(CatalogError::InvalidBounds {
                    name,
                    low: def.low_lim,
                    high: def.high_lim,
                });
            }

            check_templates(&name, &def)?;

            quantities.push(Quantity {
                name,
                def,
                combo,
                dep: None,
                index,
            });
        }

        // Resolve state dependencies to indices once all names are known.
        for i in 0..quantities.len() {
            let (state_quant, states) = {
                let def = &quantities[i].def;
                (def.state_quant.clone(), def.states.clone())
            };
            if let Some(target) = state_quant {
                let controller =
                    *by_name
                        .get(&target)
                        .ok_or_else(|| CatalogError::UnknownDependency {
                            name: quantities[i].name.clone(),
                            target: target.clone(),
                        })?;
                if states.is_empty() {
                    return Err(CatalogError::EmptyStates(quantities[i].name.clone()));
                }
                quantities[i].dep = Some(StateDependency { controller, states });
            }
        }

        detect_cycles(&quantities)?;

        Ok(Self {
            instrument,
            quantities,
            by_name,
        })
    }

    pub fn instrument(&self) -> &InstrumentMeta {
        &self.instrument
    }

    /// Look up a quantity by name.
    pub fn lookup(&self, name: &str) -> Result<&Quantity, EngineError> {
        self.by_name
            .get(name)
            .map(|&idx| &self.quantities[idx])
            .ok_or_else(|| EngineError::UnknownQuantity(name.to_string()))
    }

    /// Quantity at a validated catalog index.
    pub(crate) fn at(&self, index: usize) -> &Quantity {
        &self.quantities[index]
    }

    /// Name of the quantity at a catalog index. Indexes come from resolved
    /// dependencies.
    pub fn at_name(&self, index: usize) -> &str {
        self.quantities[index].name()
    }

    /// All quantities in declaration order.
    pub fn all(&self) -> impl Iterator<Item = &Quantity> {
        self.quantities.iter()
    }

    pub fn len(&self) -> usize {
        self.quantities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quantities.is_empty()
    }
}

/// Verify every command template against the placeholders the formatter
/// supplies for that slot. A read command carries no value, so `{value}`
/// in a `get_cmd` is a load-time fault.
fn check_templates(name: &str, def: &QuantityDef) -> Result<(), CatalogError> {
    let slots: [(Option<&str>, &[&str]); 5] = [
        (def.get_cmd.as_deref(), &["dev"]),
        (def.set_cmd.as_deref(), &["dev", "value"]),
        (def.sweep_cmd.as_deref(), &["dev", "value", "rate"]),
        (def.stop_cmd.as_deref(), &["dev"]),
        (def.rate_cmd.as_deref(), &["dev", "rate"]),
    ];
    for (template, allowed) in slots {
        let Some(template) = template else { continue };
        for placeholder in placeholders(template) {
            if !allowed.contains(&placeholder.as_str()) {
                return Err(CatalogError::Template {
                    name: name.to_string(),
                    template: template.to_string(),
                    detail: format!("unknown placeholder '{{{placeholder}}}'"),
                });
            }
        }
    }
    Ok(())
}

/// Placeholder names in a `strfmt` template, `{{` escapes skipped and any
/// format spec after `:` dropped.
fn placeholders(template: &str) -> Vec<String> {
    let mut found = Vec::new();
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        rest = &rest[open + 1..];
        if rest.starts_with('{') {
            rest = &rest[1..];
            continue;
        }
        let Some(close) = rest.find('}') else { break };
        let inner = &rest[..close];
        let name = inner.split(':').next().unwrap_or(inner);
        found.push(name.to_string());
        rest = &rest[close + 1..];
    }
    found
}

/// Reject cyclic visibility dependencies.
///
/// Each quantity has at most one outgoing edge (to its controller), so the
/// graph is a functional graph; a colored walk over each chain finds any
/// cycle in one pass.
fn detect_cycles(quantities: &[Quantity]) -> Result<(), CatalogError> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        White,
        Grey,
        Black,
    }

    let mut marks = vec![Mark::White; quantities.len()];

    for start in 0..quantities.len() {
        if marks[start] != Mark::White {
            continue;
        }
        let mut chain = Vec::new();
        let mut node = start;
        loop {
            match marks[node] {
                Mark::Black => break,
                Mark::Grey => {
                    return Err(CatalogError::DependencyCycle(
                        quantities[node].name.clone(),
                    ));
                }
                Mark::White => {
                    marks[node] = Mark::Grey;
                    chain.push(node);
                    match &quantities[node].dep {
                        Some(dep) => node = dep.controller,
                        None => break,
                    }
                }
            }
        }
        for visited in chain {
            marks[visited] = Mark::Black;
        }
    }
    Ok(())
}
