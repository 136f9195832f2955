use serde::{Serialize, Serializer};
use std::fmt;

use crate::error::{AppError, Result};

/// A subscriber number in canonical `254XXXXXXXXX` form.
///
/// The only way to obtain one is [`Msisdn::parse`], so every number that
/// reaches the processor has been normalized the same way.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Msisdn(String);

impl Msisdn {
    /// Accepts `07XXXXXXXX`, `01XXXXXXXX`, `7XXXXXXXX`, `+2547XXXXXXXX` and
    /// `2547XXXXXXXX`, with any spacing or punctuation.
    pub fn parse(input: &str) -> Result<Self> {
        let digits: String = input.chars().filter(|c| c.is_ascii_digit()).collect();

        let canonical = if digits.starts_with("254") {
            digits
        } else if let Some(rest) = digits.strip_prefix('0') {
            format!("254{}", rest)
        } else if digits.len() == 9 {
            format!("254{}", digits)
        } else {
            return Err(AppError::Validation(format!("Invalid phone number format: {}", input)));
        };

        if is_canonical(&canonical) {
            Ok(Self(canonical))
        } else {
            Err(AppError::Validation(format!("Invalid phone number format: {}", input)))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// `254` followed by a `1` or `7` prefix and eight more digits.
fn is_canonical(digits: &str) -> bool {
    digits.len() == 12
        && digits.starts_with("254")
        && matches!(digits.as_bytes()[3], b'1' | b'7')
        && digits.bytes().all(|b| b.is_ascii_digit())
}

impl fmt::Display for Msisdn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for Msisdn {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}
