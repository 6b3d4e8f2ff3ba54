//! # Access Key Verification
//!
//! Models may be bound to an access key. The header stores a CRC-32
//! fingerprint of the key and an optional expiry instant; the key itself
//! never appears in the artifact.
//!
//! ## Rejected keys:
//! - empty or whitespace-only
//! - containing characters outside `[A-Za-z0-9+/=_.-]` or shorter than 8 characters
//! - fingerprint differs from the one the model was issued for
//! - model terms expired

use crate::error::{EngineError, EngineResult};
use crate::transcription::checksum::crc32;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const MIN_KEY_LEN: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseTerms {
    /// Lowercase hex CRC-32 of the trimmed access key
    pub key_fingerprint: String,
    #[serde(default)]
    pub not_after: Option<DateTime<Utc>>,
    #[serde(default)]
    pub licensee: Option<String>,
}

impl LicenseTerms {
    pub fn for_key(access_key: &str) -> Self {
        Self {
            key_fingerprint: fingerprint(access_key),
            not_after: None,
            licensee: None,
        }
    }
}

pub fn fingerprint(access_key: &str) -> String {
    format!("{:08x}", crc32(access_key.trim().as_bytes()))
}

/// Check the key's shape without a model at hand.
pub fn check_format(access_key: &str) -> EngineResult<()> {
    let key = access_key.trim();
    if key.is_empty() {
        return Err(EngineError::InvalidCredentials("AccessKey must not be empty".into()));
    }
    if key.len() < MIN_KEY_LEN {
        return Err(EngineError::InvalidCredentials("AccessKey is too short".into()));
    }
    if !key
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '/' | '=' | '_' | '-' | '.'))
    {
        return Err(EngineError::InvalidCredentials("AccessKey contains invalid characters".into()));
    }
    Ok(())
}

/// Authorize `access_key` against the model's terms at instant `now`.
///
/// A model without terms accepts any well-formed key.
pub fn verify(access_key: &str, terms: Option<&LicenseTerms>, now: DateTime<Utc>) -> EngineResult<()> {
    check_format(access_key)?;

    let Some(terms) = terms else {
        return Ok(());
    };

    if !terms.key_fingerprint.eq_ignore_ascii_case(&fingerprint(access_key)) {
        return Err(EngineError::InvalidCredentials(
            "AccessKey is not authorized for this model".into(),
        ));
    }

    if let Some(not_after) = terms.not_after {
        if now > not_after {
            return Err(EngineError::InvalidCredentials(format!(
                "AccessKey expired on {}",
                not_after.to_rfc3339()
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    const KEY: &str = "dGVzdC1hY2Nlc3Mta2V5";

    #[test]
    fn test_format_checks() {
        assert!(check_format(KEY).is_ok());
        assert!(check_format("   ").is_err());
        assert!(check_format("short").is_err());
        assert!(matches!(
            check_format("has spaces inside"),
            Err(EngineError::InvalidCredentials(_))
        ));
    }

    #[test]
    fn test_fingerprint_match() {
        let terms = LicenseTerms::for_key(KEY);
        let now = Utc::now();
        assert!(verify(KEY, Some(&terms), now).is_ok());
        assert!(verify(&format!("  {}  ", KEY), Some(&terms), now).is_ok());
        assert!(verify("b3RoZXIta2V5LXZhbHVl", Some(&terms), now).is_err());
        assert!(verify("b3RoZXIta2V5LXZhbHVl", None, now).is_ok());
    }

    #[test]
    fn test_expiry() {
        let now = Utc::now();
        let terms = LicenseTerms {
            not_after: Some(now - Duration::days(1)),
            ..LicenseTerms::for_key(KEY)
        };
        let err = verify(KEY, Some(&terms), now).unwrap_err();
        assert!(err.to_string().contains("expired"));

        let terms = LicenseTerms {
            not_after: Some(now + Duration::days(1)),
            ..LicenseTerms::for_key(KEY)
        };
        assert!(verify(KEY, Some(&terms), now).is_ok());
    }
}
