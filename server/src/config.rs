//! Server configuration
//!
//! Configuration is loaded from environment variables. See `.env.example` for documentation.

use std::env;

/// Main server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address
    pub host: String,
    /// Server port
    pub port: u16,

    /// Grid endpoint configuration
    pub grid: GridConfig,

    /// Polyfill configuration
    pub polyfill: PolyfillConfig,
}

/// Grid endpoint configuration
#[derive(Debug, Clone)]
pub struct GridConfig {
    /// Resolution used when a request omits `res`
    pub default_resolution: u8,
    /// Largest `k` accepted by the k-ring endpoint
    pub max_k: u32,
}

/// Polyfill tier configuration
#[derive(Debug, Clone)]
pub struct PolyfillConfig {
    /// Whether the native tiler tier is tried before the sampler
    pub native_enabled: bool,
    /// Upper bound on sample points used by the fallback sampler
    pub max_samples: usize,
    /// Baseline sampling step in degrees
    pub base_step_deg: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            grid: GridConfig::default(),
            polyfill: PolyfillConfig::default(),
        }
    }
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            default_resolution: 9,
            max_k: 10,
        }
    }
}

impl Default for PolyfillConfig {
    fn default() -> Self {
        Self {
            native_enabled: true,
            max_samples: 2500,
            base_step_deg: 0.002,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    ///
    /// Unparseable or out-of-range values are ignored and the default is kept.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        // Server config
        if let Some(host) = lookup("HOST") {
            config.host = host;
        }
        if let Some(port) = lookup("PORT")
            && let Ok(p) = port.parse()
        {
            config.port = p;
        }

        // Grid config
        if let Some(val) = lookup("DEFAULT_RESOLUTION")
            && let Ok(res) = val.parse::<u8>()
            && res <= 15
        {
            config.grid.default_resolution = res;
        }
        if let Some(val) = lookup("MAX_K")
            && let Ok(k) = val.parse()
        {
            config.grid.max_k = k;
        }

        // Polyfill config
        if let Some(val) = lookup("POLYFILL_NATIVE") {
            config.polyfill.native_enabled = val.to_lowercase() == "true" || val == "1";
        }
        if let Some(val) = lookup("POLYFILL_MAX_SAMPLES")
            && let Ok(n) = val.parse::<usize>()
            && n > 0
        {
            config.polyfill.max_samples = n;
        }
        if let Some(val) = lookup("POLYFILL_BASE_STEP_DEG")
            && let Ok(step) = val.parse::<f64>()
            && step.is_finite()
            && step > 0.0
        {
            config.polyfill.base_step_deg = step;
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8080);
        assert_eq!(config.grid.default_resolution, 9);
        assert_eq!(config.grid.max_k, 10);
        assert!(config.polyfill.native_enabled);
        assert_eq!(config.polyfill.max_samples, 2500);
    }

    #[test]
    fn test_config_from_lookup() {
        let config = Config::from_lookup(lookup_from(&[
            ("PORT", "9000"),
            ("DEFAULT_RESOLUTION", "7"),
            ("POLYFILL_NATIVE", "false"),
            ("POLYFILL_MAX_SAMPLES", "100"),
        ]));
        assert_eq!(config.port, 9000);
        assert_eq!(config.grid.default_resolution, 7);
        assert!(!config.polyfill.native_enabled);
        assert_eq!(config.polyfill.max_samples, 100);
    }

    #[test]
    fn test_invalid_values_keep_defaults() {
        let config = Config::from_lookup(lookup_from(&[
            ("PORT", "not-a-port"),
            ("DEFAULT_RESOLUTION", "16"),
            ("POLYFILL_MAX_SAMPLES", "0"),
            ("POLYFILL_BASE_STEP_DEG", "-1"),
        ]));
        assert_eq!(config.port, 8080);
        assert_eq!(config.grid.default_resolution, 9);
        assert_eq!(config.polyfill.max_samples, 2500);
        assert_eq!(config.polyfill.base_step_deg, 0.002);
    }
}
