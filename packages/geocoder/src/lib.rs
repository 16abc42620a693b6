#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Reverse geocoding of affected-building centroids to postal codes.
//!
//! Providers are described by TOML files under `services/` and loaded
//! through the [`service_registry`]. Every provider sits behind the
//! [`ReverseGeocoder`] trait and is wrapped in a [`RateLimitedGeocoder`]
//! so requests go out one at a time with the provider's minimum delay.
//!
//! Geocoding is best-effort: a failed lookup leaves the postal code unset
//! for that record and never aborts a run.

pub mod geocodio;
pub mod rate_limit;
pub mod service_registry;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;

pub use rate_limit::{Clock, RateLimiter, TokioClock};
use service_registry::{GeocodingService, ProviderConfig};

/// A US postal code, optionally with its ZIP+4 suffix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostalCode {
    /// Five-digit ZIP code.
    pub zip: String,
    /// Four-digit add-on, when the provider returned one.
    pub plus4: Option<String>,
}

impl fmt::Display for PostalCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.plus4 {
            Some(plus4) => write!(f, "{}-{plus4}", self.zip),
            None => f.write_str(&self.zip),
        }
    }
}

/// Errors from geocoding operations.
#[derive(Debug, Error)]
pub enum GeocodeError {
    /// HTTP request failed. Holds the error without its request URL.
    #[error("HTTP error: {0}")]
    Http(reqwest::Error),

    /// The provider answered with a non-200 status.
    #[error("Geocoder returned status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, for diagnostics.
        body: String,
    },

    /// Response parsing failed.
    #[error("Parse error: {message}")]
    Parse {
        /// Description of the parsing failure.
        message: String,
    },

    /// The provider's API key environment variable is not set.
    #[error("Environment variable {variable} is not set")]
    MissingApiKey {
        /// Name of the variable.
        variable: String,
    },

    /// No service with the requested id exists in the registry.
    #[error("Unknown geocoding service '{id}'")]
    UnknownService {
        /// Requested service id.
        id: String,
    },
}

impl From<reqwest::Error> for GeocodeError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e.without_url())
    }
}

/// Resolves a WGS84 coordinate to a postal code.
#[async_trait]
pub trait ReverseGeocoder: Send + Sync {
    /// Looks up the postal code at `(latitude, longitude)`.
    ///
    /// Returns `Ok(None)` when the provider has no result for the point.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError`] if the request fails or the provider
    /// answers with a non-200 status or an unreadable body.
    async fn reverse(&self, latitude: f64, longitude: f64)
    -> Result<Option<PostalCode>, GeocodeError>;

    /// Provider name for log messages.
    fn name(&self) -> &str;
}

/// A geocoder whose requests are spaced by a [`RateLimiter`].
///
/// The limiter is held across the request, so concurrent callers are
/// serialized.
pub struct RateLimitedGeocoder<G, C = TokioClock> {
    inner: G,
    limiter: Mutex<RateLimiter<C>>,
}

impl<G, C> RateLimitedGeocoder<G, C> {
    /// Wraps `inner` with `limiter`.
    pub fn new(inner: G, limiter: RateLimiter<C>) -> Self {
        Self {
            inner,
            limiter: Mutex::new(limiter),
        }
    }
}

#[async_trait]
impl<G: ReverseGeocoder, C: Clock> ReverseGeocoder for RateLimitedGeocoder<G, C> {
    async fn reverse(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<Option<PostalCode>, GeocodeError> {
        let mut limiter = self.limiter.lock().await;
        limiter.acquire().await;
        self.inner.reverse(latitude, longitude).await
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

/// Builds the rate-limited client for a registry service.
///
/// # Errors
///
/// Returns [`GeocodeError::MissingApiKey`] if the service's API key
/// variable is unset.
pub fn build_geocoder(
    service: &GeocodingService,
    client: reqwest::Client,
) -> Result<Box<dyn ReverseGeocoder>, GeocodeError> {
    match &service.provider {
        ProviderConfig::Geocodio {
            base_url,
            api_key_env,
            rate_limit_ms,
            fields,
        } => {
            let api_key =
                std::env::var(api_key_env).map_err(|_| GeocodeError::MissingApiKey {
                    variable: api_key_env.clone(),
                })?;

            let geocodio = geocodio::GeocodioClient::new(client, base_url, api_key)
                .with_fields(fields.clone());
            let limiter = RateLimiter::new(TokioClock::new(), Duration::from_millis(*rate_limit_ms));

            log::info!(
                "Using {} reverse geocoder ({}ms between requests)",
                service.name,
                rate_limit_ms
            );

            Ok(Box::new(RateLimitedGeocoder::new(geocodio, limiter)))
        }
    }
}

/// Builds the client for the registry service with the given id.
///
/// # Errors
///
/// Returns [`GeocodeError::UnknownService`] if no such service exists, or
/// any error from [`build_geocoder`].
pub fn build_geocoder_by_id(
    id: &str,
    client: reqwest::Client,
) -> Result<Box<dyn ReverseGeocoder>, GeocodeError> {
    let service = service_registry::service(id).ok_or_else(|| GeocodeError::UnknownService {
        id: id.to_string(),
    })?;
    build_geocoder(&service, client)
}
