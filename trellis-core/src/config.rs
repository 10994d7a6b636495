//! Runtime Configuration
//!
//! The engine keeps all of its state in thread-locals, so configuration is
//! per thread as well. A host installs a [`Config`] once at startup with
//! [`configure`]; every component reads the current value through
//! [`config`].
//!
//! Configuration can be built in code or loaded from JSON:
//!
//! ```rust,ignore
//! let config = Config::from_json_str(r#"{ "flush": "tokio_local" }"#)?;
//! trellis_core::config::configure(config)?;
//! ```

use std::cell::RefCell;

use serde::{Deserialize, Serialize};

use crate::error::{ReactiveError, Result};

/// How a pending job flush gets executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushStrategy {
    /// The host event loop calls [`crate::scheduler::flush_jobs`] itself.
    #[default]
    Manual,

    /// One flush task is spawned with `tokio::task::spawn_local` for every
    /// pending flush. The calling thread must be running inside a
    /// `tokio::task::LocalSet`.
    TokioLocal,
}

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Flush driver for the job queue.
    pub flush: FlushStrategy,

    /// Maximum number of times a single job may run within one flush.
    pub recursion_limit: usize,

    /// Number of recent warnings retained by [`crate::diagnostics`].
    pub warning_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            flush: FlushStrategy::Manual,
            recursion_limit: 100,
            warning_capacity: 64,
        }
    }
}

impl Config {
    /// Parse and validate a configuration from JSON.
    ///
    /// Missing fields take their default value; unknown fields are rejected.
    pub fn from_json_str(input: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the configuration is usable.
    pub fn validate(&self) -> Result<()> {
        if self.recursion_limit == 0 {
            return Err(ReactiveError::InvalidConfig(
                "recursion_limit must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

thread_local! {
    static CONFIG: RefCell<Config> = RefCell::new(Config::default());
}

/// Install a configuration for the current thread.
pub fn configure(config: Config) -> Result<()> {
    config.validate()?;
    tracing::debug!(?config, "reactive runtime configured");
    CONFIG.with(|current| *current.borrow_mut() = config);
    Ok(())
}

/// The configuration active on the current thread.
pub fn config() -> Config {
    CONFIG
        .try_with(|current| current.borrow().clone())
        .unwrap_or_default()
}
