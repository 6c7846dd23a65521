//! Configuration management.
//!
//! Configuration comes from three layers, later layers winning:
//!
//! 1. Built-in defaults
//! 2. A TOML file (`config.toml` in the platform config dir, or an explicit path)
//! 3. `CRMSYNC_*` environment variables
//!
//! Similarity index weights are deliberately absent: they are fixed policy,
//! see [`crate::services::IndexWeights`].

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// Main configuration for crmsync.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrmSyncConfig {
    /// Window sizing.
    pub window: WindowConfig,
    /// Scroll policy.
    pub scroll: ScrollConfig,
    /// Logging settings.
    pub logging: LoggingSettings,
}

/// Window sizing configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowConfig {
    /// Maximum records kept materialized.
    ///
    /// Default: 50.
    pub max_size: usize,
    /// Records prefetched beyond the viewport on a fresh fill.
    ///
    /// Default: 3.
    pub overshoot: usize,
    /// Records requested per page.
    ///
    /// Default: 15.
    pub page_size: usize,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            max_size: 50,
            overshoot: 3,
            page_size: 15,
        }
    }
}

impl WindowConfig {
    /// Sets the maximum window size.
    #[must_use]
    pub const fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    /// Sets the overshoot.
    #[must_use]
    pub const fn with_overshoot(mut self, overshoot: usize) -> Self {
        self.overshoot = overshoot;
        self
    }

    /// Sets the page size.
    #[must_use]
    pub const fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }
}

/// Scroll policy configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollConfig {
    /// Remaining-items threshold below which a page is requested.
    ///
    /// Default: 5.
    pub threshold: usize,
    /// Fixed list item height in pixels.
    ///
    /// Default: 34.
    pub item_height_px: u32,
    /// Items visible in the viewport.
    ///
    /// Default: 10.
    pub viewport_items: usize,
}

impl Default for ScrollConfig {
    fn default() -> Self {
        Self {
            threshold: 5,
            item_height_px: 34,
            viewport_items: 10,
        }
    }
}

/// Logging settings as read from config.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoggingSettings {
    /// Output format: `pretty` or `json`.
    pub format: Option<String>,
    /// Filter directive, e.g. `crmsync=debug`.
    pub level: Option<String>,
    /// Optional log file path.
    pub file: Option<PathBuf>,
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    /// Window section.
    pub window: Option<ConfigFileWindow>,
    /// Scroll section.
    pub scroll: Option<ConfigFileScroll>,
    /// Logging section.
    pub logging: Option<ConfigFileLogging>,
}

/// Window section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileWindow {
    /// Maximum window size.
    pub max_size: Option<usize>,
    /// Overshoot.
    pub overshoot: Option<usize>,
    /// Page size.
    pub page_size: Option<usize>,
}

/// Scroll section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileScroll {
    /// Remaining-items threshold.
    pub threshold: Option<usize>,
    /// Item height in pixels.
    pub item_height_px: Option<u32>,
    /// Viewport items.
    pub viewport_items: Option<usize>,
}

/// Logging section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileLogging {
    /// Output format.
    pub format: Option<String>,
    /// Filter directive.
    pub level: Option<String>,
    /// Log file path.
    pub file: Option<String>,
}

impl CrmSyncConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a file path, then applies env overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or a value is
    /// out of range.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::OperationFailed {
            operation: "read_config_file".to_string(),
            cause: format!("{}: {e}", path.display()),
        })?;

        let file: ConfigFile = toml::from_str(&contents).map_err(|e| Error::OperationFailed {
            operation: "parse_config_file".to_string(),
            cause: e.to_string(),
        })?;

        let config = Self::from_config_file(file).with_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from the default location.
    ///
    /// Checks the platform config dir first, then `~/.config/crmsync/`.
    /// Returns defaults (with env overrides) if no readable file is found.
    #[must_use]
    pub fn load_default() -> Self {
        let Some(base_dirs) = directories::BaseDirs::new() else {
            return Self::default().with_env_overrides();
        };

        let candidates = [
            base_dirs.config_dir().join("crmsync").join("config.toml"),
            base_dirs
                .home_dir()
                .join(".config")
                .join("crmsync")
                .join("config.toml"),
        ];
        for path in candidates {
            if !path.exists() {
                continue;
            }
            match Self::load_from_file(&path) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Ignoring unreadable config file"
                    );
                },
            }
        }

        Self::default().with_env_overrides()
    }

    /// Applies environment variable overrides.
    ///
    /// | Variable | Description | Default |
    /// |----------|-------------|---------|
    /// | `CRMSYNC_WINDOW_MAX_SIZE` | Maximum window size | 50 |
    /// | `CRMSYNC_WINDOW_OVERSHOOT` | Prefetch beyond viewport | 3 |
    /// | `CRMSYNC_WINDOW_PAGE_SIZE` | Records per page | 15 |
    /// | `CRMSYNC_SCROLL_THRESHOLD` | Remaining-items threshold | 5 |
    /// | `CRMSYNC_LOG_FORMAT` | `pretty` or `json` | pretty |
    /// | `CRMSYNC_LOG_LEVEL` | Filter directive | info |
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(v) = parse_env::<usize>("CRMSYNC_WINDOW_MAX_SIZE") {
            self.window.max_size = v.max(1);
        }
        if let Some(v) = parse_env::<usize>("CRMSYNC_WINDOW_OVERSHOOT") {
            self.window.overshoot = v;
        }
        if let Some(v) = parse_env::<usize>("CRMSYNC_WINDOW_PAGE_SIZE") {
            self.window.page_size = v.max(1);
        }
        if let Some(v) = parse_env::<usize>("CRMSYNC_SCROLL_THRESHOLD") {
            self.scroll.threshold = v;
        }
        if let Ok(v) = std::env::var("CRMSYNC_LOG_FORMAT") {
            self.logging.format = Some(v);
        }
        if let Ok(v) = std::env::var("CRMSYNC_LOG_LEVEL") {
            self.logging.level = Some(v);
        }
        self
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for a zero window size, zero page size,
    /// or zero item height.
    pub fn validate(&self) -> Result<()> {
        if self.window.max_size == 0 {
            return Err(Error::InvalidInput("window.max_size must be > 0".into()));
        }
        if self.window.page_size == 0 {
            return Err(Error::InvalidInput("window.page_size must be > 0".into()));
        }
        if self.scroll.item_height_px == 0 {
            return Err(Error::InvalidInput("scroll.item_height_px must be > 0".into()));
        }
        Ok(())
    }

    /// Converts a `ConfigFile` to `CrmSyncConfig`.
    fn from_config_file(file: ConfigFile) -> Self {
        let mut config = Self::default();

        if let Some(window) = file.window {
            if let Some(v) = window.max_size {
                config.window.max_size = v;
            }
            if let Some(v) = window.overshoot {
                config.window.overshoot = v;
            }
            if let Some(v) = window.page_size {
                config.window.page_size = v;
            }
        }
        if let Some(scroll) = file.scroll {
            if let Some(v) = scroll.threshold {
                config.scroll.threshold = v;
            }
            if let Some(v) = scroll.item_height_px {
                config.scroll.item_height_px = v;
            }
            if let Some(v) = scroll.viewport_items {
                config.scroll.viewport_items = v;
            }
        }
        if let Some(logging) = file.logging {
            config.logging.format = logging.format;
            config.logging.level = logging.level;
            config.logging.file = logging.file.map(PathBuf::from);
        }

        config
    }

    /// Sets the window configuration.
    #[must_use]
    pub const fn with_window(mut self, window: WindowConfig) -> Self {
        self.window = window;
        self
    }

    /// Sets the scroll configuration.
    #[must_use]
    pub const fn with_scroll(mut self, scroll: ScrollConfig) -> Self {
        self.scroll = scroll;
        self
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}
