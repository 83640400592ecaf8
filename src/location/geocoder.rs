//! Best-effort reverse geocoding.
//!
//! Geocoding only decorates the alert message. Callers use
//! [`lookup_best_effort`], which logs and swallows every failure.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Default Nominatim endpoint.
pub const DEFAULT_NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org";

/// HTTP connect timeout for the reqwest client.
const CONNECT_TIMEOUT_SECS: u64 = 5;

/// HTTP request timeout. Kept short: the alert should not wait on this.
const REQUEST_TIMEOUT_SECS: u64 = 10;

/// A resolved street address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    /// Comma-separated full address.
    pub formatted_address: String,
    /// Most specific single component (road, suburb, or city).
    pub short_address: String,
}

/// Errors from reverse geocoding.
#[derive(Debug, thiserror::Error)]
pub enum GeocodeError {
    /// HTTP transport failure.
    #[error("geocoder request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The service answered with an error status or error payload.
    #[error("geocoder service error: {0}")]
    Service(String),

    /// No usable address components came back.
    #[error("no address found")]
    NoAddress,
}

/// Reverse geocoding capability.
#[async_trait]
pub trait ReverseGeocoder: Send + Sync {
    /// Resolve a coordinate to an address.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError`] on any failure.
    async fn lookup(&self, latitude: f64, longitude: f64) -> Result<Address, GeocodeError>;
}

/// Resolve an address, degrading every failure to `None`.
pub async fn lookup_best_effort(
    geocoder: Option<&dyn ReverseGeocoder>,
    latitude: f64,
    longitude: f64,
) -> Option<Address> {
    let geocoder = geocoder?;
    match geocoder.lookup(latitude, longitude).await {
        Ok(address) => {
            debug!(short = %address.short_address, "address resolved");
            Some(address)
        }
        Err(e) => {
            warn!(error = %e, "reverse geocoding failed, continuing without address");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Nominatim
// ---------------------------------------------------------------------------

/// Address components returned by Nominatim.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NominatimAddress {
    /// Street name.
    pub road: Option<String>,
    /// Suburb or neighbourhood.
    pub suburb: Option<String>,
    /// City name.
    pub city: Option<String>,
    /// Town name (used when there is no city).
    pub town: Option<String>,
    /// Village name (used when there is no city or town).
    pub village: Option<String>,
    /// State or region.
    pub state: Option<String>,
    /// Country.
    pub country: Option<String>,
}

#[derive(Deserialize)]
struct NominatimResponse {
    error: Option<String>,
    address: Option<NominatimAddress>,
}

/// Compose an [`Address`] from Nominatim components.
///
/// Returns `None` when no component is present.
pub fn format_address(components: &NominatimAddress) -> Option<Address> {
    let locality = components
        .city
        .as_ref()
        .or(components.town.as_ref())
        .or(components.village.as_ref());

    let parts: Vec<&str> = [
        components.road.as_ref(),
        components.suburb.as_ref(),
        locality,
        components.state.as_ref(),
        components.country.as_ref(),
    ]
    .into_iter()
    .flatten()
    .map(String::as_str)
    .filter(|s| !s.trim().is_empty())
    .collect();

    if parts.is_empty() {
        return None;
    }

    let short_address = components
        .road
        .as_ref()
        .or(components.suburb.as_ref())
        .or(components.city.as_ref())
        .cloned()
        .unwrap_or_else(|| "Unknown location".to_owned());

    Some(Address {
        formatted_address: parts.join(", "),
        short_address,
    })
}

/// Reverse geocoder backed by a Nominatim HTTP endpoint.
pub struct NominatimGeocoder {
    client: reqwest::Client,
    base_url: String,
}

impl std::fmt::Debug for NominatimGeocoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NominatimGeocoder")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl NominatimGeocoder {
    /// Create a geocoder for `base_url`, identifying as `user_agent`.
    pub fn new(base_url: String, user_agent: &str) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(user_agent.to_owned())
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "failed to build HTTP client with timeouts, using default");
                reqwest::Client::default()
            });
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
        }
    }

    /// Build the reverse lookup URL for a coordinate.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError::Service`] if the base URL is malformed.
    pub fn reverse_url(&self, latitude: f64, longitude: f64) -> Result<url::Url, GeocodeError> {
        url::Url::parse_with_params(
            &format!("{}/reverse", self.base_url),
            &[
                ("format", "json".to_owned()),
                ("lat", latitude.to_string()),
                ("lon", longitude.to_string()),
                ("zoom", "18".to_owned()),
                ("addressdetails", "1".to_owned()),
            ],
        )
        .map_err(|e| GeocodeError::Service(format!("invalid geocoder url: {e}")))
    }
}

#[async_trait]
impl ReverseGeocoder for NominatimGeocoder {
    async fn lookup(&self, latitude: f64, longitude: f64) -> Result<Address, GeocodeError> {
        let url = self.reverse_url(latitude, longitude)?;
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(GeocodeError::Service(format!("status {status}")));
        }
        let body: NominatimResponse = response.json().await?;
        if let Some(error) = body.error {
            return Err(GeocodeError::Service(error));
        }
        body.address
            .as_ref()
            .and_then(format_address)
            .ok_or(GeocodeError::NoAddress)
    }
}
