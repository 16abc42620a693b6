//! Compile-time registry of reverse geocoding service configurations.
//!
//! Each provider is defined in a TOML file under `services/`. The
//! registry embeds these at compile time and exposes them via
//! [`all_services`], [`enabled_services`], and [`service`].

use serde::Deserialize;

/// A geocoding service configuration loaded from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct GeocodingService {
    /// Unique identifier (e.g., `"geocodio"`).
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Whether this service may be selected.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Selection order, lower first.
    pub priority: u32,
    /// Provider-specific configuration.
    pub provider: ProviderConfig,
}

/// Provider-specific configuration, tagged by `type` in TOML.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderConfig {
    /// Geocodio reverse geocoder.
    Geocodio {
        /// API base URL including the version (e.g.,
        /// `"https://api.geocod.io/v1.7"`).
        base_url: String,
        /// Environment variable holding the API key.
        api_key_env: String,
        /// Minimum delay between requests in milliseconds.
        rate_limit_ms: u64,
        /// Field blocks to request (`zip4` for ZIP+4 data).
        #[serde(default)]
        fields: Vec<String>,
    },
}

const fn default_true() -> bool {
    true
}

impl GeocodingService {
    /// Returns the provider's base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        match &self.provider {
            ProviderConfig::Geocodio { base_url, .. } => base_url,
        }
    }

    /// Minimum delay between requests in milliseconds.
    #[must_use]
    pub const fn rate_limit_ms(&self) -> u64 {
        match &self.provider {
            ProviderConfig::Geocodio { rate_limit_ms, .. } => *rate_limit_ms,
        }
    }
}

// ── Compile-time embedded TOML files ────────────────────────────────

const SERVICE_TOMLS: &[(&str, &str)] = &[("geocodio", include_str!("../services/geocodio.toml"))];

#[cfg(test)]
const EXPECTED_SERVICE_COUNT: usize = 1;

/// Returns all geocoding service configurations (enabled and disabled).
///
/// # Panics
///
/// Panics if any TOML config is malformed (the configs are embedded, so
/// this is caught by the registry tests).
#[must_use]
pub fn all_services() -> Vec<GeocodingService> {
    SERVICE_TOMLS
        .iter()
        .map(|(name, toml_str)| {
            toml::de::from_str(toml_str)
                .unwrap_or_else(|e| panic!("Failed to parse geocoding service '{name}': {e}"))
        })
        .collect()
}

/// Returns only enabled services, sorted by priority (ascending).
#[must_use]
pub fn enabled_services() -> Vec<GeocodingService> {
    let mut services: Vec<GeocodingService> =
        all_services().into_iter().filter(|s| s.enabled).collect();
    services.sort_by_key(|s| s.priority);
    services
}

/// Returns the service with the given id, enabled or not.
#[must_use]
pub fn service(id: &str) -> Option<GeocodingService> {
    all_services().into_iter().find(|s| s.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn loads_all_services() {
        assert_eq!(all_services().len(), EXPECTED_SERVICE_COUNT);
    }

    #[test]
    fn service_ids_are_unique() {
        let services = all_services();
        let mut seen = BTreeSet::new();
        for svc in &services {
            assert!(seen.insert(&svc.id), "Duplicate service ID: {}", svc.id);
        }
    }

    #[test]
    fn all_services_have_required_fields() {
        for svc in &all_services() {
            assert!(!svc.id.is_empty(), "Service has empty id");
            assert!(!svc.name.is_empty(), "Service {} has empty name", svc.id);
            assert!(
                !svc.base_url().is_empty(),
                "Service {} has empty base_url",
                svc.id
            );
        }
    }

    #[test]
    fn geocodio_defaults() {
        let geocodio = service("geocodio").unwrap();
        assert_eq!(geocodio.rate_limit_ms(), 3000);
        assert_eq!(geocodio.base_url(), "https://api.geocod.io/v1.7");
        let ProviderConfig::Geocodio {
            api_key_env,
            fields,
            ..
        } = &geocodio.provider;
        assert_eq!(api_key_env, "GEOCODIO_API_KEY");
        assert_eq!(fields, &vec!["zip4".to_string()]);
    }

    #[test]
    fn enabled_services_sorted_by_priority() {
        let services = enabled_services();
        assert!(!services.is_empty());
        for window in services.windows(2) {
            assert!(window[0].priority <= window[1].priority);
        }
    }
}
