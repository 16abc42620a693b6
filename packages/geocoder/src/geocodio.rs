//! Geocodio reverse geocoding client.
//!
//! Requests `GET {base_url}/reverse?q={lat},{lon}&fields=zip4&api_key=...`.
//! The ZIP code comes from `results[0].address_components.zip` and the
//! ZIP+4 suffix from the `plus4` entry of the `zip4` field block.
//!
//! See <https://www.geocod.io/docs/#reverse-geocoding>

use async_trait::async_trait;
use serde_json::Value;

use crate::{GeocodeError, PostalCode, ReverseGeocoder};

/// Geocodio API client.
#[derive(Debug, Clone)]
pub struct GeocodioClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    fields: Vec<String>,
}

impl GeocodioClient {
    /// Creates a client requesting the `zip4` field block.
    #[must_use]
    pub fn new(client: reqwest::Client, base_url: &str, api_key: String) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            fields: vec!["zip4".to_string()],
        }
    }

    /// Replaces the requested field blocks.
    #[must_use]
    pub fn with_fields(mut self, fields: Vec<String>) -> Self {
        self.fields = fields;
        self
    }
}

#[async_trait]
impl ReverseGeocoder for GeocodioClient {
    async fn reverse(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<Option<PostalCode>, GeocodeError> {
        let resp = self
            .client
            .get(format!("{}/reverse", self.base_url))
            .query(&[
                ("q", format!("{latitude},{longitude}")),
                ("fields", self.fields.join(",")),
                ("api_key", self.api_key.clone()),
            ])
            .send()
            .await?;

        let status = resp.status();
        if status != reqwest::StatusCode::OK {
            let body = resp.text().await.unwrap_or_default();
            return Err(GeocodeError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: Value = resp.json().await?;
        parse_response(&body)
    }

    fn name(&self) -> &str {
        "geocodio"
    }
}

/// Parses a Geocodio reverse geocoding response.
///
/// # Errors
///
/// Returns [`GeocodeError::Parse`] if the body has no `results` array.
pub fn parse_response(body: &Value) -> Result<Option<PostalCode>, GeocodeError> {
    let results = body["results"]
        .as_array()
        .ok_or_else(|| GeocodeError::Parse {
            message: "Geocodio response has no results array".to_string(),
        })?;

    let Some(first) = results.first() else {
        return Ok(None);
    };

    let Some(zip) = first["address_components"]["zip"].as_str() else {
        return Ok(None);
    };

    Ok(Some(PostalCode {
        zip: zip.to_string(),
        plus4: find_plus4(&first["fields"]).map(String::from),
    }))
}

/// Depth-first search for the first `plus4` value under `value`.
///
/// Geocodio nests it as `fields.zip4.plus4: ["1234"]`; a bare string is
/// accepted too.
fn find_plus4(value: &Value) -> Option<&str> {
    match value {
        Value::Object(map) => {
            if let Some(plus4) = map.get("plus4") {
                let found = match plus4 {
                    Value::String(s) => Some(s.as_str()),
                    Value::Array(items) => items.iter().find_map(Value::as_str),
                    _ => None,
                };
                if found.is_some() {
                    return found;
                }
            }
            map.values().find_map(find_plus4)
        }
        Value::Array(items) => items.iter().find_map(find_plus4),
        _ => None,
    }
}
