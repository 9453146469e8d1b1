//! A string that never shows up in logs, debug output or serialized config,
//! used for the SMTP password.

use bon::Builder;
use getset::Getters;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{Debug, Formatter};
use std::result;
use validator::Validate;
use zeroize::Zeroize;

pub static REDACTED: &str = "###REDACTED###";

#[derive(Validate, Clone, Zeroize, Builder, PartialEq, Eq, Getters)]
#[getset(get = "pub")]
pub struct RedactedString {
    #[validate(length(min = 8))]
    #[builder(into)]
    inner: String,
}

impl Debug for RedactedString {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(REDACTED)
    }
}

impl Serialize for RedactedString {
    fn serialize<S: Serializer>(&self, serializer: S) -> result::Result<S::Ok, S::Error> {
        serializer.serialize_str(REDACTED)
    }
}

impl<'de> Deserialize<'de> for RedactedString {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> result::Result<Self, D::Error> {
        String::deserialize(deserializer).map(|inner| Self::builder().inner(inner).build())
    }
}

impl Drop for RedactedString {
    fn drop(&mut self) {
        self.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redacted_string_validation() {
        assert!(RedactedString::builder()
            .inner("valid_password")
            .build()
            .validate()
            .is_ok());
        assert!(RedactedString::builder()
            .inner("short")
            .build()
            .validate()
            .is_err());
    }

    #[test]
    fn test_redacted_string_hidden() {
        let secret = RedactedString::builder().inner("smtp-secret-42").build();

        assert_eq!(format!("{secret:?}"), REDACTED);
        assert_eq!(serde_json::to_string(&secret).unwrap(), format!("\"{REDACTED}\""));
        assert_eq!(secret.inner(), "smtp-secret-42");
    }

    #[test]
    fn test_redacted_string_deserialize() {
        let secret: RedactedString = serde_yml::from_str("\"smtp-secret-42\"").unwrap();

        assert_eq!(secret.inner(), "smtp-secret-42");
    }
}
