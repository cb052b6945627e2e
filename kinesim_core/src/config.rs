//! Runtime configuration.
//!
//! Loaded once at startup from an optional JSON file, then overridden by
//! command-line flags. The `configget`/`configset` commands read and write
//! individual keys at runtime through a `serde_json::Value` round trip, so a
//! value is accepted only if it deserializes into the field's type.

use crate::clock::ClockTiming;
use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Configuration for a runtime context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Update loop rate in Hz (default: 50)
    pub tick_rate_hz: u32,

    /// Lower bound on the inter-tick wait (default: 1 ms)
    pub min_sleep_ms: u64,

    /// Upper bound on the inter-tick wait (default: 20 ms)
    pub max_sleep_ms: u64,

    /// Directory of the sled tile archive
    pub tile_archive_path: PathBuf,

    /// Address the message server binds to
    pub listen_addr: String,

    /// Directory searched for `<name>.scn` scenario scripts
    pub scenario_dir: PathBuf,

    /// Largest per-axis sample count a tile or patch command may build
    pub max_tile_samples: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: 50,
            min_sleep_ms: 1,
            max_sleep_ms: 20,
            tile_archive_path: PathBuf::from("kinesim-tiles"),
            listen_addr: "127.0.0.1:7400".to_string(),
            scenario_dir: PathBuf::from("scenarios"),
            max_tile_samples: 3601,
        }
    }
}

impl RuntimeConfig {
    /// Reads a JSON config file. Missing keys take their defaults.
    pub fn load(path: impl AsRef<Path>) -> CoreResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        serde_json::from_str(&text).map_err(|e| CoreError::Config(format!("{}: {}", path.as_ref().display(), e)))
    }

    /// Update loop cadence described by this config.
    pub fn timing(&self) -> ClockTiming {
        ClockTiming::from_rate(self.tick_rate_hz, self.min_sleep_ms, self.max_sleep_ms)
    }

    /// All keys with their current values, in key order.
    pub fn entries(&self) -> CoreResult<Vec<(String, Value)>> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map.into_iter().collect()),
            _ => Err(CoreError::Config("config did not serialize to an object".to_string())),
        }
    }

    pub fn get(&self, key: &str) -> CoreResult<Value> {
        self.entries()?
            .into_iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
            .ok_or_else(|| CoreError::Config(format!("unknown key '{}'", key)))
    }

    /// Sets one key from its text form.
    ///
    /// The text is parsed as JSON first (so `60` is a number), falling back to
    /// a plain string (so paths need no quoting). The whole config is then
    /// re-validated; on any failure `self` is unchanged.
    pub fn set(&mut self, key: &str, raw: &str) -> CoreResult<()> {
        let mut object = match serde_json::to_value(&*self)? {
            Value::Object(map) => map,
            _ => return Err(CoreError::Config("config did not serialize to an object".to_string())),
        };
        let slot = object
            .get_mut(key)
            .ok_or_else(|| CoreError::Config(format!("unknown key '{}'", key)))?;
        *slot = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));

        let updated: RuntimeConfig = serde_json::from_value(Value::Object(object))
            .map_err(|e| CoreError::Config(format!("bad value '{}' for {}: {}", raw, key, e)))?;
        *self = updated;
        Ok(())
    }
}
