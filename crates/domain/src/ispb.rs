use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// 8-digit code identifying a PIX participant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ispb(String);

impl Ispb {
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let raw = raw.trim();
        if raw.len() != 8 || !raw.bytes().all(|b| b.is_ascii_digit()) {
            return Err(DomainError::Validation(format!(
                "ISPB must be exactly 8 digits, got {raw:?}"
            )));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Ispb {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Ispb::parse(&value)
    }
}

impl From<Ispb> for String {
    fn from(value: Ispb) -> Self {
        value.0
    }
}

impl fmt::Display for Ispb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
