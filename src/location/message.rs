//! Rendering of the location alert body.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};

use super::geocoder::Address;
use super::LocationFix;

/// Coordinates with six decimal places (~0.1 m), as used in the message.
fn coordinate(value: f64) -> String {
    format!("{value:.6}")
}

/// Google Maps link for a coordinate pair.
pub fn google_maps_link(latitude: f64, longitude: f64) -> String {
    format!(
        "https://maps.google.com/?q={},{}",
        coordinate(latitude),
        coordinate(longitude)
    )
}

/// Apple Maps link for a coordinate pair.
pub fn apple_maps_link(latitude: f64, longitude: f64) -> String {
    format!(
        "http://maps.apple.com/?ll={},{}",
        coordinate(latitude),
        coordinate(longitude)
    )
}

/// Human-readable fix time.
pub fn format_fix_time(timestamp_ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(timestamp_ms)
        .unwrap_or_else(Utc::now)
        .format("%Y-%m-%d %H:%M:%S UTC")
        .to_string()
}

/// Append a headed block followed by a blank line.
fn push_section(message: &mut String, heading: &str, lines: &[&str]) {
    let _ = writeln!(message, "{heading}");
    for line in lines {
        let _ = writeln!(message, "{line}");
    }
    let _ = writeln!(message);
}

/// Compose the emergency location alert body.
///
/// Deterministic for a given fix and address. The address block is omitted
/// when no address (or an empty one) is supplied.
pub fn render_message(fix: &LocationFix, address: Option<&Address>) -> String {
    let mut message = String::new();
    push_section(&mut message, "🚨 EMERGENCY LOCATION ALERT 🚨", &[]);
    push_section(&mut message, "I need immediate assistance at this location:", &[]);

    if let Some(address) = address.filter(|a| !a.formatted_address.is_empty()) {
        push_section(&mut message, "📍 ADDRESS:", &[&address.formatted_address]);
    }

    let lat = format!("Lat: {}", coordinate(fix.latitude));
    let lon = format!("Lon: {}", coordinate(fix.longitude));
    push_section(&mut message, "📍 COORDINATES:", &[&lat, &lon]);

    let google = format!("Google Maps: {}", google_maps_link(fix.latitude, fix.longitude));
    let apple = format!("Apple Maps: {}", apple_maps_link(fix.latitude, fix.longitude));
    push_section(&mut message, "📍 MAP LINKS:", &[&google, &apple]);

    let accuracy = if fix.accuracy > 0.0 {
        format!("{:.1} meters", fix.accuracy)
    } else {
        "High precision".to_owned()
    };
    push_section(&mut message, "📍 ACCURACY:", &[&accuracy]);

    let time = format!("🕒 TIME: {}", format_fix_time(fix.timestamp));
    push_section(&mut message, &time, &[]);

    message.push_str("📍 Sent via SafeSearch Emergency App");
    message
}
