//! SHA-256 certificate fingerprints (pins).
//!
//! A fingerprint is the SHA-256 digest of a certificate's DER encoding. The
//! text form accepted by [`Fingerprint::parse`] is 64 hex digits, optionally
//! separated by colons and surrounded by whitespace. Comparison is always
//! exact byte equality.

use crate::util;
use crate::TrustError;
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Length in bytes of a SHA-256 digest.
pub const FINGERPRINT_LEN: usize = 32;

/// SHA-256 digest of a DER-encoded certificate.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; FINGERPRINT_LEN]);

impl Fingerprint {
    /// Wrap raw digest bytes.
    pub const fn from_bytes(bytes: [u8; FINGERPRINT_LEN]) -> Self {
        Self(bytes)
    }

    /// Compute the fingerprint of DER-encoded certificate bytes.
    pub fn of_der(der_bytes: &[u8]) -> Self {
        Self(Sha256::digest(der_bytes).into())
    }

    /// Parse a human-supplied fingerprint string.
    ///
    /// Colons and surrounding whitespace are stripped, then the remainder
    /// must be exactly 64 hex digits (either case).
    pub fn parse(text: &str) -> Result<Self, TrustError> {
        let cleaned = text.replace(':', "");
        let cleaned = cleaned.trim();

        let mut bytes = [0u8; FINGERPRINT_LEN];
        hex::decode_to_slice(cleaned, &mut bytes).map_err(|e| {
            TrustError::InvalidFingerprintFormat(match e {
                hex::FromHexError::InvalidStringLength | hex::FromHexError::OddLength => format!(
                    "expected a SHA-256 fingerprint ({} hex digits), got {} characters",
                    FINGERPRINT_LEN * 2,
                    cleaned.len()
                ),
                other => other.to_string(),
            })
        })?;

        Ok(Self(bytes))
    }

    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; FINGERPRINT_LEN] {
        &self.0
    }

    /// Plain lowercase hex (64 characters, no separators).
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

/// Colon-separated uppercase hex, the form certificate tools usually print.
impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&util::hex_colon_upper(&self.0))
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.to_hex())
    }
}

impl FromStr for Fingerprint {
    type Err = TrustError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const HELLO_SHA256: &str = "dffd6021bb2bd5b0af676290809ec3a53191dd81c7f70a4b28688a362182986f";

    #[test]
    fn of_der_is_sha256() {
        let fp = Fingerprint::of_der(b"Hello, World!");
        assert_eq!(fp.to_hex(), HELLO_SHA256);
    }

    #[test]
    fn parse_plain_hex() {
        let fp = Fingerprint::parse(HELLO_SHA256).unwrap();
        assert_eq!(fp, Fingerprint::of_der(b"Hello, World!"));
    }

    #[test]
    fn parse_colon_separated_uppercase() {
        let fp = Fingerprint::of_der(b"Hello, World!");
        let text = fp.to_string();
        assert_eq!(text.len(), 32 * 3 - 1);
        assert_eq!(Fingerprint::parse(&text).unwrap(), fp);
    }

    #[test]
    fn parse_strips_surrounding_whitespace() {
        let text = format!("  {HELLO_SHA256}\n");
        assert!(Fingerprint::parse(&text).is_ok());
    }

    #[test]
    fn reject_short_input() {
        let err = Fingerprint::parse(&HELLO_SHA256[..62]).unwrap_err();
        assert!(matches!(err, TrustError::InvalidFingerprintFormat(_)));
    }

    #[test]
    fn reject_sha1_length() {
        let err = Fingerprint::parse("da39a3ee5e6b4b0d3255bfef95601890afd80709").unwrap_err();
        assert!(matches!(err, TrustError::InvalidFingerprintFormat(_)));
    }

    #[test]
    fn reject_non_hex() {
        let text = format!("zz{}", &HELLO_SHA256[2..]);
        let err = Fingerprint::parse(&text).unwrap_err();
        assert!(matches!(err, TrustError::InvalidFingerprintFormat(_)));
    }

    #[test]
    fn reject_empty() {
        assert!(Fingerprint::parse("").is_err());
        assert!(Fingerprint::parse(" : ").is_err());
    }

    #[test]
    fn debug_shows_hex() {
        let fp = Fingerprint::parse(HELLO_SHA256).unwrap();
        assert_eq!(format!("{fp:?}"), format!("Fingerprint({HELLO_SHA256})"));
    }

    proptest! {
        #[test]
        fn roundtrip_any_formatting(bytes in any::<[u8; 32]>(), upper in any::<bool>(), colons in any::<bool>()) {
            let mut text = hex::encode(bytes);
            if upper {
                text = text.to_uppercase();
            }
            if colons {
                text = text
                    .as_bytes()
                    .chunks(2)
                    .map(|c| String::from_utf8_lossy(c).into_owned())
                    .collect::<Vec<_>>()
                    .join(":");
            }
            let fp = Fingerprint::parse(&text).unwrap();
            prop_assert_eq!(fp.as_bytes(), &bytes);
        }

        #[test]
        fn wrong_length_always_rejected(bytes in proptest::collection::vec(any::<u8>(), 0..64)) {
            prop_assume!(bytes.len() != FINGERPRINT_LEN);
            let err = Fingerprint::parse(&hex::encode(&bytes)).unwrap_err();
            prop_assert!(matches!(err, TrustError::InvalidFingerprintFormat(_)));
        }

        #[test]
        fn non_hex_always_rejected(pos in 0usize..64, c in "[g-zG-Z!#%&]") {
            let mut text = HELLO_SHA256.to_string();
            text.replace_range(pos..pos + 1, &c);
            let err = Fingerprint::parse(&text).unwrap_err();
            prop_assert!(matches!(err, TrustError::InvalidFingerprintFormat(_)));
        }
    }
}
