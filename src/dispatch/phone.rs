//! Phone number normalization for SMS dispatch.

/// Minimum digit count accepted for dispatch.
pub const MIN_PHONE_DIGITS: usize = 10;

/// Maximum digit count accepted for dispatch (E.164 limit).
pub const MAX_PHONE_DIGITS: usize = 15;

/// Strip every non-digit character.
pub fn strip_non_digits(phone: &str) -> String {
    phone.chars().filter(char::is_ascii_digit).collect()
}

/// Normalize a phone number for sending.
///
/// Returns the bare digits when their count is within
/// [`MIN_PHONE_DIGITS`]..=[`MAX_PHONE_DIGITS`], otherwise `None`.
pub fn normalize_phone(phone: &str) -> Option<String> {
    let digits = strip_non_digits(phone);
    (MIN_PHONE_DIGITS..=MAX_PHONE_DIGITS)
        .contains(&digits.len())
        .then_some(digits)
}
