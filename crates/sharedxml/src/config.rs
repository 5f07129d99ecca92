//! Runtime configuration

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use tracing::warn;

use crate::xml;

pub const DATA_DIR_VAR: &str = "SHAREDXML_DATA_DIR";
pub const WAIT_TIMEOUT_VAR: &str = "SHAREDXML_WAIT_TIMEOUT_MS";
pub const RENDER_DEBOUNCE_VAR: &str = "SHAREDXML_RENDER_DEBOUNCE_MS";

/// Settings shared by the loader and live views
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Directory that file names passed to the loader are resolved against
    pub data_dir: PathBuf,
    /// Interval between checks for a tree root that has not arrived yet
    pub poll_interval: Duration,
    /// Bound on the tree root wait (`None` waits forever)
    pub wait_timeout: Option<Duration>,
    /// Window for coalescing change notifications before re-subscribing
    pub refetch_debounce: Duration,
    /// Window for coalescing re-subscriptions before re-rendering
    pub render_debounce: Duration,
    pub parser: xml::Config,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            poll_interval: Duration::from_millis(500),
            wait_timeout: Some(Duration::from_secs(30)),
            refetch_debounce: Duration::from_millis(100),
            render_debounce: Duration::from_millis(5000),
            parser: xml::Config::default(),
        }
    }
}

impl Config {
    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = data_dir.into();
        self
    }

    /// Defaults overridden by `SHAREDXML_*` environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each variable
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(dir) = lookup(DATA_DIR_VAR).filter(|dir| !dir.trim().is_empty()) {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(ms) = millis(&lookup, WAIT_TIMEOUT_VAR) {
            // 0 disables the bound
            config.wait_timeout = (ms > 0).then(|| Duration::from_millis(ms));
        }
        if let Some(ms) = millis(&lookup, RENDER_DEBOUNCE_VAR) {
            config.render_debounce = Duration::from_millis(ms);
        }
        config
    }

    /// Path of `file` under the data directory; a name without an extension
    /// is taken to be an `.xml` file. Names that are absolute or step out of
    /// the data directory resolve to `None`.
    pub fn resolve_source(&self, file: &str) -> Option<PathBuf> {
        let relative = Path::new(file);
        let confined = relative
            .components()
            .all(|component| matches!(component, Component::Normal(_) | Component::CurDir));
        if !confined {
            warn!("refusing file name outside the data directory: {file}");
            return None;
        }
        let mut path = self.data_dir.join(relative);
        if relative.extension().is_none() {
            path.set_extension("xml");
        }
        Some(std::path::absolute(&path).unwrap_or(path))
    }
}

fn millis(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<u64> {
    let raw = lookup(name)?;
    match raw.trim().parse::<u64>() {
        Ok(ms) => Some(ms),
        Err(err) => {
            warn!("ignoring {name}={raw}: {err}");
            None
        }
    }
}
