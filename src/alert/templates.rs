//! Fixed alert message templates.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::location::LocationFix;

const FOOTER: &str = "📍 Sent via SafeSearch App";

/// Kind of canned emergency alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmergencyKind {
    /// General request for help.
    General,
    /// Medical emergency.
    Medical,
    /// Police assistance.
    Police,
    /// Fire emergency.
    Fire,
}

impl EmergencyKind {
    /// Returns the lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Medical => "medical",
            Self::Police => "police",
            Self::Fire => "fire",
        }
    }
}

impl FromStr for EmergencyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "general" => Ok(Self::General),
            "medical" => Ok(Self::Medical),
            "police" => Ok(Self::Police),
            "fire" => Ok(Self::Fire),
            other => Err(format!("unknown emergency kind: {other}")),
        }
    }
}

fn format_time(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// Body for a canned emergency alert.
///
/// `custom` replaces the body of a [`EmergencyKind::General`] alert and is
/// ignored for the other kinds.
pub fn emergency_message(kind: EmergencyKind, custom: Option<&str>, now: DateTime<Utc>) -> String {
    let (header, body) = match kind {
        EmergencyKind::Medical => ("🚨 MEDICAL EMERGENCY 🚨", "I need immediate medical assistance!"),
        EmergencyKind::Police => ("🚨 POLICE ASSISTANCE NEEDED 🚨", "I need police assistance immediately!"),
        EmergencyKind::Fire => ("🚨 FIRE EMERGENCY 🚨", "I need fire department assistance!"),
        EmergencyKind::General => {
            if let Some(text) = custom.filter(|t| !t.trim().is_empty()) {
                return text.to_owned();
            }
            ("🚨 EMERGENCY ALERT 🚨", "I need immediate assistance!")
        }
    };
    format!("{header}\n\n{body}\n\nTime: {}\n{FOOTER}", format_time(now))
}

/// Body for an audio alert linking to an uploaded recording.
pub fn audio_message(url: &str, duration_seconds: f64, now: DateTime<Utc>) -> String {
    let seconds = duration_seconds.max(0.0).round();
    format!(
        "🚨 EMERGENCY AUDIO MESSAGE 🚨\n\n\
         I've sent an emergency audio message ({seconds:.0} seconds).\n\n\
         Listen here: {url}\n\n\
         Time: {}\n{FOOTER}",
        format_time(now)
    )
}

/// Confirmation prompt shown after a fix is acquired.
pub fn location_prompt(fix: &LocationFix, target_count: usize) -> String {
    let accuracy = if fix.accuracy > 0.0 {
        format!("{:.0} meters", fix.accuracy.round())
    } else {
        "Good".to_owned()
    };
    format!("Accuracy: {accuracy}\n\nSend to {target_count} contact(s)?")
}
