use serde::{Deserialize, Serialize};

/// Driver configuration.
///
/// Create via `DriverConfig::default()` and adjust with the `with_*`
/// methods before passing it to [`crate::FgbDriver::open_with_config`].
///
/// Defaults:
/// - `cache_row_address`: `true`, sequential scans record row offsets
/// - `warm_cache_on_open`: `false`, the index is not read until asked
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Record the offset of every row passed during a scan. Turning this off
    /// saves memory on pure sequential reads at the cost of slower jumps.
    pub cache_row_address: bool,
    /// Seed the offset cache from the spatial index right after open.
    pub warm_cache_on_open: bool,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            cache_row_address: true,
            warm_cache_on_open: false,
        }
    }
}

impl DriverConfig {
    pub fn with_cache_row_address(mut self, enabled: bool) -> Self {
        self.cache_row_address = enabled;
        self
    }

    pub fn with_warm_cache_on_open(mut self, enabled: bool) -> Self {
        self.warm_cache_on_open = enabled;
        self
    }
}
