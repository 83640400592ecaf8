//! SafeSearch: emergency alerts to trusted contacts.
//!
//! Keeps a local list of trusted contacts, acquires the device location
//! with retries, renders it into a human-readable alert and dispatches it
//! over SMS to every selected contact, one at a time, recording what was
//! sent in each contact's history. Audio recordings are uploaded and sent
//! as links.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cancel;
pub mod config;
pub mod logging;

pub mod contacts;
pub mod location;

pub mod audio;
pub mod upload;

pub mod dispatch;

pub mod alert;
