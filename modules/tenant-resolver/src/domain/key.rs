//! Tenant key syntax and reserved-word rules.
//!
//! A key is a single DNS label: lowercase ASCII letters, digits and hyphens,
//! 1 to 63 characters, no leading or trailing hyphen.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::config::TenancyConfig;

#[allow(clippy::expect_used)] // literal pattern
static KEY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?$").expect("static regex should not panic")
});

/// Why a candidate key was refused.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyError {
    #[error("tenant key is empty")]
    Empty,
    #[error("tenant key must be a single DNS label of 1-63 letters, digits or hyphens")]
    Syntax,
    #[error("tenant key is reserved")]
    Reserved,
}

/// Validation rules shared by the resolver and provisioning.
#[derive(Debug, Clone)]
pub struct KeyRules {
    reserved: HashSet<String>,
}

impl KeyRules {
    /// Rules from config. Exempt subdomains are reserved as well, since a
    /// tenant holding one of them could never be resolved.
    #[must_use]
    pub fn from_config(cfg: &TenancyConfig) -> Self {
        let reserved = cfg
            .reserved_keys
            .iter()
            .chain(&cfg.exempt_subdomains)
            .map(|k| k.trim().to_ascii_lowercase())
            .collect();
        Self { reserved }
    }

    /// Lowercase and trim a user-supplied key.
    #[must_use]
    pub fn normalize(raw: &str) -> String {
        raw.trim().to_ascii_lowercase()
    }

    /// Check an already normalized key.
    ///
    /// # Errors
    /// Returns the first rule the key breaks.
    pub fn validate(&self, key: &str) -> Result<(), KeyError> {
        if key.is_empty() {
            return Err(KeyError::Empty);
        }
        if !KEY_PATTERN.is_match(key) {
            return Err(KeyError::Syntax);
        }
        if self.reserved.contains(key) {
            return Err(KeyError::Reserved);
        }
        Ok(())
    }

    #[must_use]
    pub fn is_reserved(&self, key: &str) -> bool {
        self.reserved.contains(key)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn rules() -> KeyRules {
        KeyRules::from_config(&TenancyConfig::default())
    }

    #[test]
    fn accepts_plain_labels() {
        let r = rules();
        for key in ["acme", "a", "shop-42", "0day", &"x".repeat(63)] {
            assert_eq!(r.validate(key), Ok(()), "{key}");
        }
    }

    #[test]
    fn rejects_bad_syntax() {
        let r = rules();
        for key in ["-acme", "acme-", "ac_me", "ac.me", "ac me", "acmé", &"x".repeat(64)] {
            assert_eq!(r.validate(key), Err(KeyError::Syntax), "{key}");
        }
        assert_eq!(r.validate(""), Err(KeyError::Empty));
    }

    #[test]
    fn reserved_words_and_exempt_subdomains_are_refused() {
        let r = rules();
        assert_eq!(r.validate("admin"), Err(KeyError::Reserved));
        assert_eq!(r.validate("www"), Err(KeyError::Reserved));
        assert!(r.is_reserved("api"));
    }

    #[test]
    fn normalize_trims_and_lowercases() {
        assert_eq!(KeyRules::normalize("  Acme-Shop "), "acme-shop");
    }
}
