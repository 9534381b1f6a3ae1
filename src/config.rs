//! Binding configuration.
//!
//! Defaults match what an interactive diagram needs; everything can be
//! loaded from JSON or overridden from the environment.

use std::rc::Rc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::recycle::{KeepAlive, NeverRecycle, RecyclePolicy};

/// Environment variable overriding the recycle grace period, in milliseconds.
const ENV_RECYCLE_GRACE_MS: &str = "GRAPH_BINDING_RECYCLE_GRACE_MS";
/// Environment variable enabling or disabling recycling (`1/0/true/false`).
const ENV_RECYCLE: &str = "GRAPH_BINDING_RECYCLE";

/// Tunables of one graph binding.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BindingConfig {
    /// Keep unmounted cells parked for reuse.
    pub recycle: bool,
    /// How long a parked cell waits for a remount before it is disposed.
    pub recycle_grace_ms: u64,
    /// z-index given to cells whose descriptor does not set one.
    pub default_z_index: i32,
}

impl Default for BindingConfig {
    fn default() -> Self {
        Self {
            recycle: true,
            recycle_grace_ms: 300,
            default_z_index: 1,
        }
    }
}

impl BindingConfig {
    /// Defaults overlaid with the process environment.
    pub fn from_env() -> Self {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with values from `get_env`. Unparsable values are
    /// ignored.
    pub fn from_env_with<F>(get_env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(enabled) = get_env(ENV_RECYCLE).and_then(|v| parse_bool(&v)) {
            config.recycle = enabled;
        }
        if let Some(ms) = get_env(ENV_RECYCLE_GRACE_MS).and_then(|v| v.trim().parse().ok()) {
            config.recycle_grace_ms = ms;
        }
        config
    }

    pub fn recycle_grace(&self) -> Duration {
        Duration::from_millis(self.recycle_grace_ms)
    }

    pub fn with_recycle(mut self, enabled: bool) -> Self {
        self.recycle = enabled;
        self
    }

    pub fn with_recycle_grace(mut self, grace: Duration) -> Self {
        self.recycle_grace_ms = grace.as_millis() as u64;
        self
    }

    /// Recycle policy described by this config.
    pub fn recycle_policy(&self) -> Rc<dyn RecyclePolicy> {
        if self.recycle {
            Rc::new(KeepAlive::new(self.recycle_grace()))
        } else {
            Rc::new(NeverRecycle)
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
