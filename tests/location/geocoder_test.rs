//! Tests for `src/location/geocoder.rs`.

use async_trait::async_trait;

use safesearch::location::geocoder::{
    format_address, lookup_best_effort, Address, GeocodeError, NominatimAddress,
    ReverseGeocoder,
};

struct FailingGeocoder;

#[async_trait]
impl ReverseGeocoder for FailingGeocoder {
    async fn lookup(&self, _latitude: f64, _longitude: f64) -> Result<Address, GeocodeError> {
        Err(GeocodeError::Service("rate limited".to_owned()))
    }
}

struct FixedGeocoder;

#[async_trait]
impl ReverseGeocoder for FixedGeocoder {
    async fn lookup(&self, _latitude: f64, _longitude: f64) -> Result<Address, GeocodeError> {
        Ok(Address {
            formatted_address: "Main St, Springfield".to_owned(),
            short_address: "Main St".to_owned(),
        })
    }
}

#[test]
fn format_address_joins_present_components() {
    let components = NominatimAddress {
        road: Some("Baker Street".to_owned()),
        town: Some("Marylebone".to_owned()),
        country: Some("United Kingdom".to_owned()),
        ..NominatimAddress::default()
    };
    let address = format_address(&components).expect("address should format");
    assert_eq!(
        address.formatted_address,
        "Baker Street, Marylebone, United Kingdom"
    );
    assert_eq!(address.short_address, "Baker Street");
}

#[test]
fn format_address_prefers_city_over_town() {
    let components = NominatimAddress {
        city: Some("Paris".to_owned()),
        town: Some("Ignored".to_owned()),
        ..NominatimAddress::default()
    };
    let address = format_address(&components).expect("address should format");
    assert_eq!(address.formatted_address, "Paris");
    assert_eq!(address.short_address, "Paris");
}

#[test]
fn format_address_without_components_is_none() {
    assert!(format_address(&NominatimAddress::default()).is_none());
}

#[test]
fn short_address_falls_back_to_unknown() {
    let components = NominatimAddress {
        state: Some("Bavaria".to_owned()),
        ..NominatimAddress::default()
    };
    let address = format_address(&components).expect("address should format");
    assert_eq!(address.short_address, "Unknown location");
}

#[tokio::test]
async fn best_effort_swallows_failures() {
    let result = lookup_best_effort(Some(&FailingGeocoder), 1.0, 2.0).await;
    assert!(result.is_none());
}

#[tokio::test]
async fn best_effort_without_geocoder_is_none() {
    assert!(lookup_best_effort(None, 1.0, 2.0).await.is_none());
}

#[tokio::test]
async fn best_effort_passes_through_address() {
    let result = lookup_best_effort(Some(&FixedGeocoder), 1.0, 2.0).await;
    assert_eq!(
        result.map(|a| a.short_address),
        Some("Main St".to_owned())
    );
}
