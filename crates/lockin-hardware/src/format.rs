//! Command formatting from catalog templates.
//!
//! Templates are preserved byte-for-byte apart from `{dev}`, `{value}` and
//! `{rate}` substitution via `strfmt`. COMBO values are translated to their
//! device code before substitution; BOOLEAN renders `0`/`1`; DOUBLE renders
//! the shortest round-trip decimal.

use std::collections::HashMap;

use lockin_core::{CatalogError, EngineError, Value};
use strfmt::strfmt;

use crate::catalog::schema::Datatype;
use crate::catalog::Quantity;

/// Read command for a quantity, or `None` for a cache-only quantity.
pub fn format_get(quantity: &Quantity, dev: &str) -> Result<Option<String>, EngineError> {
    match &quantity.def().get_cmd {
        Some(template) => render(quantity, template, dev, None, None).map(Some),
        None => Ok(None),
    }
}

/// Write command for a validated value, or `None` for a cache-only
/// quantity. Falls back to the read template when no `set_cmd` is declared;
/// a template with no `{value}` placeholder gets the rendered value appended
/// as ` <value>`, the path-write form.
pub fn format_set(
    quantity: &Quantity,
    dev: &str,
    value: &Value,
) -> Result<Option<String>, EngineError> {
    let def = quantity.def();
    let Some(template) = def.set_cmd.as_deref().or(def.get_cmd.as_deref()) else {
        return Ok(None);
    };

    let rendered = render_value(quantity, value)?;
    if template.contains("{value}") {
        render(quantity, template, dev, Some(&rendered), None).map(Some)
    } else {
        let path = render(quantity, template, dev, None, None)?;
        Ok(Some(format!("{path} {rendered}")))
    }
}

/// Ramp command toward a target at a rate. Quantities without a `sweep_cmd`
/// cannot sweep.
pub fn format_sweep(
    quantity: &Quantity,
    dev: &str,
    rate: f64,
    target: &Value,
) -> Result<String, EngineError> {
    let template = quantity
        .def()
        .sweep_cmd
        .as_deref()
        .ok_or_else(|| EngineError::SweepUnsupported(quantity.name().to_string()))?;
    let rendered = render_value(quantity, target)?;
    render(quantity, template, dev, Some(&rendered), Some(rate))
}

/// Playback-rate write preceding a waveform upload, or `None` when the
/// catalog declares no rate template for this quantity.
pub fn format_rate(quantity: &Quantity, dev: &str, code: u8) -> Result<Option<String>, EngineError> {
    match &quantity.def().rate_cmd {
        Some(template) => {
            render(quantity, template, dev, None, Some(f64::from(code))).map(Some)
        }
        None => Ok(None),
    }
}

/// Abort command for an active sweep.
pub fn format_stop(quantity: &Quantity, dev: &str) -> Result<String, EngineError> {
    let template = quantity
        .def()
        .stop_cmd
        .as_deref()
        .ok_or_else(|| EngineError::SweepUnsupported(quantity.name().to_string()))?;
    render(quantity, template, dev, None, None)
}

/// Render a typed value to its wire form for this quantity.
pub fn render_value(quantity: &Quantity, value: &Value) -> Result<String, EngineError> {
    match quantity.datatype() {
        Datatype::Combo => {
            let combo = quantity.combo().ok_or_else(|| EngineError::TypeMismatch {
                quantity: quantity.name().to_string(),
                datatype: quantity.datatype().to_string(),
            })?;
            let label = value.as_str().ok_or_else(|| EngineError::TypeMismatch {
                quantity: quantity.name().to_string(),
                datatype: quantity.datatype().to_string(),
            })?;
            combo.encode(quantity.name(), label).map(str::to_string)
        }
        _ => Ok(value.render()),
    }
}

/// Parse a device response into the quantity's typed value. COMBO responses
/// are device codes and decode to labels.
pub fn parse_response(
    quantity: &Quantity,
    command: &str,
    response: &str,
) -> Result<Value, EngineError> {
    let text = response.trim();
    match quantity.datatype() {
        Datatype::Double => text
            .parse::<f64>()
            .map(Value::Double)
            .map_err(|_| bad_response(command, response)),
        Datatype::Boolean => match text {
            "0" => Ok(Value::Bool(false)),
            "1" => Ok(Value::Bool(true)),
            other => other
                .parse::<f64>()
                .ok()
                .and_then(|v| Value::Double(v).as_bool())
                .map(Value::Bool)
                .ok_or_else(|| bad_response(command, response)),
        },
        Datatype::Combo => {
            let combo = quantity.combo().ok_or_else(|| bad_response(command, response))?;
            combo
                .decode(quantity.name(), text)
                .map(|label| Value::Str(label.to_string()))
        }
        Datatype::String => Ok(Value::Str(text.to_string())),
        Datatype::Vector => lockin_core::value::parse_samples(text)
            .map(Value::Vector)
            .ok_or_else(|| bad_response(command, response)),
        Datatype::Button => Ok(Value::Bool(true)),
    }
}

fn bad_response(command: &str, response: &str) -> EngineError {
    EngineError::BadResponse {
        command: command.to_string(),
        response: response.to_string(),
    }
}

fn render(
    quantity: &Quantity,
    template: &str,
    dev: &str,
    value: Option<&str>,
    rate: Option<f64>,
) -> Result<String, EngineError> {
    let mut fmt_context = HashMap::new();
    fmt_context.insert("dev".to_string(), dev.to_string());
    if let Some(value) = value {
        fmt_context.insert("value".to_string(), value.to_string());
    }
    if let Some(rate) = rate {
        fmt_context.insert("rate".to_string(), Value::Double(rate).render());
    }
    // Placeholders were checked at catalog load, so a failure here is a
    // catalog fault, never a device one.
    strfmt(template, &fmt_context).map_err(|e| {
        EngineError::Catalog(CatalogError::Template {
            name: quantity.name().to_string(),
            template: template.to_string(),
            detail: e.to_string(),
        })
    })
}
