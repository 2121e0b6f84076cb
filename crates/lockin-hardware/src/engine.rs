//! The dispatch engine: one serialized connection, a value cache, and the
//! request lifecycle tying catalog, validator, formatter and transfer
//! manager together.
//!
//! Every request passes visibility check, local validation, formatting and
//! only then transport I/O. The transport sits behind an async mutex so a
//! single device operation is in flight at a time; callers queue in
//! submission order. The cache is written only after a confirmed device
//! response, so readers always see acknowledged state.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use lockin_core::{limits, CatalogError, EngineError, Result, Transport, Value};
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::catalog::schema::Datatype;
use crate::catalog::{Catalog, Quantity};
use crate::format;
use crate::settings::{EngineSettings, RejectMatcher};
use crate::validate;
use crate::vector::{self, PlaybackRate, Trace};
use crate::visibility;

/// Engine over one instrument connection.
pub struct DispatchEngine {
    catalog: Arc<Catalog>,
    settings: EngineSettings,
    reject: RejectMatcher,
    dev: String,
    transport: Mutex<Box<dyn Transport>>,
    cache: RwLock<HashMap<String, Value>>,
}

impl DispatchEngine {
    /// Build an engine. The device address comes from the catalog header
    /// unless overridden with [`DispatchEngine::with_address`].
    pub fn new(
        catalog: Arc<Catalog>,
        transport: Box<dyn Transport>,
        settings: EngineSettings,
    ) -> std::result::Result<Self, CatalogError> {
        let reject = RejectMatcher::compile(&settings)?;
        let dev = catalog
            .instrument()
            .default_address
            .clone()
            .unwrap_or_else(|| "dev0".to_string());
        Ok(Self {
            catalog,
            settings,
            reject,
            dev,
            transport: Mutex::new(transport),
            cache: RwLock::new(HashMap::new()),
        })
    }

    pub fn with_address(mut self, dev: impl Into<String>) -> Self {
        self.dev = dev.into();
        self
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Current value of a quantity: the cache when warm, else a device
    /// query whose result is cached.
    pub async fn get(&self, name: &str) -> Result<Value> {
        let quantity = self.catalog.lookup(name)?;
        debug!(quantity = name, "get requested");
        if let Some(value) = self.cached(name).await {
            debug!(quantity = name, "get served from cache");
            return Ok(value);
        }
        let mut transport = self.transport.lock().await;
        self.fetch(transport.as_mut(), quantity).await
    }

    /// Write a validated value and cache it after the acknowledgment.
    ///
    /// BUTTON quantities route to [`DispatchEngine::press`]. VECTOR
    /// quantities are refused here; waveforms go through the chunked
    /// [`DispatchEngine::upload_waveform`] path.
    pub async fn set(&self, name: &str, value: Value) -> Result<Value> {
        let quantity = self.catalog.lookup(name)?;
        debug!(quantity = name, "set requested");
        if quantity.datatype() == Datatype::Button {
            self.press(name).await?;
            return Ok(value);
        }
        if quantity.datatype() == Datatype::Vector {
            return Err(EngineError::TypeMismatch {
                quantity: name.to_string(),
                datatype: quantity.datatype().to_string(),
            });
        }
        self.check_writable(quantity)?;
        let mut transport = self.transport.lock().await;
        self.ensure_active(transport.as_mut(), quantity).await?;
        validate::validate(quantity, &value)?;
        debug!(quantity = name, "set validated");
        let normalized = normalize(quantity, value)?;

        if let Some(command) = format::format_set(quantity, &self.dev, &normalized)? {
            debug!(quantity = name, %command, "set formatted");
            self.query_with_retry(transport.as_mut(), &command).await?;
        }
        // The cache commit stays inside the transport critical section so
        // commit order always matches acknowledgment order.
        self.cache
            .write()
            .await
            .insert(name.to_string(), normalized.clone());
        drop(transport);
        debug!(quantity = name, "set completed");
        Ok(normalized)
    }

    /// Fire a BUTTON action. Never cached.
    pub async fn press(&self, name: &str) -> Result<()> {
        let quantity = self.catalog.lookup(name)?;
        if quantity.datatype() != Datatype::Button {
            return Err(EngineError::TypeMismatch {
                quantity: name.to_string(),
                datatype: quantity.datatype().to_string(),
            });
        }
        self.check_writable(quantity)?;
        let mut transport = self.transport.lock().await;
        self.ensure_active(transport.as_mut(), quantity).await?;
        if let Some(command) = format::format_set(quantity, &self.dev, &Value::Bool(true))? {
            debug!(quantity = name, %command, "press formatted");
            self.query_with_retry(transport.as_mut(), &command).await?;
        }
        debug!(quantity = name, "press completed");
        Ok(())
    }

    /// Start a hardware ramp toward a target at a rate.
    pub async fn sweep(&self, name: &str, target: Value, rate: f64) -> Result<()> {
        let quantity = self.catalog.lookup(name)?;
        debug!(quantity = name, rate, "sweep requested");
        self.check_writable(quantity)?;
        let mut transport = self.transport.lock().await;
        self.ensure_active(transport.as_mut(), quantity).await?;
        validate::validate(quantity, &target)?;
        let command = format::format_sweep(quantity, &self.dev, rate, &target)?;
        debug!(quantity = name, %command, "sweep formatted");
        self.query_with_retry(transport.as_mut(), &command).await?;
        // The value is in motion; the cache entry is stale until read back.
        self.cache.write().await.remove(name);
        debug!(quantity = name, "sweep started");
        Ok(())
    }

    /// Abort an active sweep. Fire-and-forget write.
    pub async fn stop_sweep(&self, name: &str) -> Result<()> {
        let quantity = self.catalog.lookup(name)?;
        let command = format::format_stop(quantity, &self.dev)?;
        debug!(quantity = name, %command, "stop formatted");
        let mut transport = self.transport.lock().await;
        self.write_with_retry(transport.as_mut(), &command).await?;
        Ok(())
    }

    /// Upload a waveform as ordered, acknowledged chunks, after writing the
    /// playback rate when the catalog declares a rate template.
    pub async fn upload_waveform(
        &self,
        name: &str,
        samples: &[f64],
        rate: PlaybackRate,
    ) -> Result<()> {
        let quantity = self.catalog.lookup(name)?;
        debug!(quantity = name, samples = samples.len(), "upload requested");
        self.expect_vector(quantity)?;
        self.check_writable(quantity)?;
        validate::validate_nonempty_vector(quantity, samples)?;
        limits::validate_vector_len(samples.len())?;

        let base = format::format_set(quantity, &self.dev, &Value::Vector(Vec::new()))?
            .ok_or_else(|| EngineError::PermissionDenied {
                quantity: name.to_string(),
                permission: "no write command".to_string(),
            })?;
        // format_set appended the empty payload; the chunk writer supplies
        // its own.
        let base = base.trim_end().to_string();

        let mut transport = self.transport.lock().await;
        self.ensure_active(transport.as_mut(), quantity).await?;

        if let Some(rate_command) = format::format_rate(quantity, &self.dev, rate.code())? {
            debug!(quantity = name, %rate_command, "writing playback rate");
            self.query_with_retry(transport.as_mut(), &rate_command).await?;
        }

        vector::upload_chunks(
            transport.as_mut(),
            &base,
            samples,
            self.settings.chunk_samples,
            self.settings.timeout(),
            &self.reject,
        )
        .await?;
        // Commit inside the critical section, matching acknowledgment order.
        self.cache
            .write()
            .await
            .insert(name.to_string(), Value::Vector(samples.to_vec()));
        drop(transport);
        debug!(quantity = name, "upload completed");
        Ok(())
    }

    /// Poll a trace quantity until the instrument reports data or the
    /// deadline expires, then tag the samples with the catalog's x-axis
    /// metadata. The result is not cached; every fetch is a fresh
    /// acquisition readout.
    pub async fn fetch_trace(&self, name: &str, deadline: Duration) -> Result<Trace> {
        let quantity = self.catalog.lookup(name)?;
        debug!(quantity = name, ?deadline, "trace requested");
        self.expect_vector(quantity)?;
        if !quantity.def().permission.allows_device_get() {
            return Err(self.permission_denied(quantity));
        }
        let command = format::format_get(quantity, &self.dev)?.ok_or_else(|| {
            EngineError::PermissionDenied {
                quantity: name.to_string(),
                permission: "no read command".to_string(),
            }
        })?;

        let mut transport = self.transport.lock().await;
        self.ensure_active(transport.as_mut(), quantity).await?;
        let samples = vector::poll_samples(
            transport.as_mut(),
            &command,
            self.settings.timeout(),
            self.settings.poll_interval(),
            Instant::now() + deadline,
            &self.reject,
        )
        .await?;
        debug!(quantity = name, samples = samples.len(), "trace completed");

        let def = quantity.def();
        Ok(Trace {
            samples,
            x_name: def.x_name.clone(),
            x_unit: def.x_unit.clone(),
        })
    }

    /// Fire a catalog reset BUTTON and drop all cached state.
    pub async fn reset(&self, button: &str) -> Result<()> {
        self.press(button).await?;
        self.clear_cache().await;
        Ok(())
    }

    /// Forget every cached value. Called on disconnect so the next session
    /// starts from device truth.
    pub async fn clear_cache(&self) {
        self.cache.write().await.clear();
    }

    /// Cached value, if any. No device I/O.
    pub async fn cached(&self, name: &str) -> Option<Value> {
        self.cache.read().await.get(name).cloned()
    }

    // Local gates shared by every mutating operation.
    fn check_writable(&self, quantity: &Quantity) -> Result<()> {
        let def = quantity.def();
        if !def.enabled {
            return Err(EngineError::NotVisible {
                quantity: quantity.name().to_string(),
                controller: quantity.name().to_string(),
                current: "disabled".to_string(),
            });
        }
        if !def.permission.allows_set() {
            return Err(self.permission_denied(quantity));
        }
        Ok(())
    }

    fn permission_denied(&self, quantity: &Quantity) -> EngineError {
        EngineError::PermissionDenied {
            quantity: quantity.name().to_string(),
            permission: quantity.def().permission.to_string(),
        }
    }

    fn expect_vector(&self, quantity: &Quantity) -> Result<()> {
        if quantity.datatype() != Datatype::Vector {
            return Err(EngineError::TypeMismatch {
                quantity: quantity.name().to_string(),
                datatype: quantity.datatype().to_string(),
            });
        }
        Ok(())
    }

    /// Walk the controller chain bottom-up, resolving each controller from
    /// the cache or the device, and fail `NotVisible` at the first link
    /// whose held value is outside its permitted states.
    async fn ensure_active(&self, transport: &mut dyn Transport, quantity: &Quantity) -> Result<()> {
        let mut dependent = quantity;
        for controller in visibility::controller_chain(&self.catalog, quantity) {
            let Some(dep) = dependent.dependency() else {
                break;
            };
            let held = match self.cached(controller.name()).await {
                Some(value) => value,
                None => self.fetch(transport, controller).await?,
            };
            if !dep
                .states
                .iter()
                .any(|wanted| visibility::state_matches(&held, wanted))
            {
                return Err(EngineError::NotVisible {
                    quantity: quantity.name().to_string(),
                    controller: controller.name().to_string(),
                    current: held.render(),
                });
            }
            dependent = controller;
        }
        debug!(quantity = quantity.name(), "visibility checked");
        Ok(())
    }

    /// Device read for one quantity, result cached. Quantities with no read
    /// command serve their datatype default; write-only permissions fail
    /// locally.
    async fn fetch(&self, transport: &mut dyn Transport, quantity: &Quantity) -> Result<Value> {
        if !quantity.def().permission.allows_device_get() {
            return Err(self.permission_denied(quantity));
        }
        let Some(command) = format::format_get(quantity, &self.dev)? else {
            return Ok(default_value(quantity.datatype()));
        };
        debug!(quantity = quantity.name(), %command, "get formatted");
        let response = self.query_with_retry(transport, &command).await?;
        if response.len() > limits::MAX_RESPONSE_SIZE {
            return Err(EngineError::LimitExceeded {
                context: "response size",
                actual: response.len(),
                max: limits::MAX_RESPONSE_SIZE,
            });
        }
        let value = format::parse_response(quantity, &command, &response)?;
        if quantity.datatype() != Datatype::Button {
            self.cache
                .write()
                .await
                .insert(quantity.name().to_string(), value.clone());
        }
        debug!(quantity = quantity.name(), "get completed");
        Ok(value)
    }

    /// One acknowledged round-trip with bounded retries for transient
    /// transport faults. A response matching a rejection pattern surfaces
    /// immediately and is never retried.
    async fn query_with_retry(
        &self,
        transport: &mut dyn Transport,
        command: &str,
    ) -> Result<String> {
        let mut attempt = 0_u32;
        loop {
            match transport.query(command, self.settings.timeout()).await {
                Ok(response) => {
                    self.reject.check(command, &response)?;
                    return Ok(response);
                }
                Err(io) => {
                    let err = EngineError::from_io(command, io);
                    if attempt >= self.settings.max_retries {
                        return Err(err);
                    }
                    attempt += 1;
                    warn!(%command, %err, attempt, "transient fault, retrying");
                    tokio::time::sleep(self.settings.backoff(attempt)).await;
                }
            }
        }
    }

    async fn write_with_retry(&self, transport: &mut dyn Transport, command: &str) -> Result<()> {
        let mut attempt = 0_u32;
        loop {
            match transport.write(command, self.settings.timeout()).await {
                Ok(()) => return Ok(()),
                Err(io) => {
                    let err = EngineError::from_io(command, io);
                    if attempt >= self.settings.max_retries {
                        return Err(err);
                    }
                    attempt += 1;
                    warn!(%command, %err, attempt, "transient fault, retrying");
                    tokio::time::sleep(self.settings.backoff(attempt)).await;
                }
            }
        }
    }
}

/// Bring a validated value into the canonical cached form for a datatype.
fn normalize(quantity: &Quantity, value: Value) -> Result<Value> {
    match quantity.datatype() {
        Datatype::Boolean => {
            // Validation already admitted only bool or numeric 0/1.
            let b = value.as_bool().ok_or_else(|| EngineError::TypeMismatch {
                quantity: quantity.name().to_string(),
                datatype: quantity.datatype().to_string(),
            })?;
            Ok(Value::Bool(b))
        }
        _ => Ok(value),
    }
}

fn default_value(datatype: Datatype) -> Value {
    match datatype {
        Datatype::Double => Value::Double(0.0),
        Datatype::Boolean | Datatype::Button => Value::Bool(false),
        Datatype::Combo | Datatype::String => Value::Str(String::new()),
        Datatype::Vector => Value::Vector(Vec::new()),
    }
}
