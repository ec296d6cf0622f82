//! Domain normalization and hostname validation

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::DetectError;

/// A validated, lowercase hostname with no scheme, path, port or trailing dot.
///
/// The only way to obtain one is through [`normalize_domain`], so holders can
/// rely on the hostname grammar without re-checking it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NormalizedDomain(String);

impl NormalizedDomain {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for NormalizedDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NormalizedDomain {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Provides hostname validation functionality
#[derive(Debug, Default, Clone, Copy)]
pub struct DomainValidator;

impl DomainValidator {
    /// Creates a new DomainValidator instance
    pub fn new() -> Self {
        Self
    }

    /// Validates a hostname against the label grammar
    ///
    /// This function checks that the hostname:
    /// - Does not exceed 253 characters (RFC 1035)
    /// - Has at least two labels separated by dots
    /// - Has no empty labels and no label longer than 63 characters
    /// - Uses only ASCII letters, digits and hyphens inside labels
    /// - Has no label starting or ending with a hyphen
    /// - Ends in an alphabetic top-level label of at least 2 characters
    ///
    /// The alphabetic top-level label rules out bare IPv4 literals.
    pub fn validate_domain_format(&self, domain: &str) -> bool {
        if domain.is_empty() || domain.len() > 253 {
            return false;
        }

        let labels: Vec<&str> = domain.split('.').collect();
        if labels.len() < 2 {
            return false;
        }

        for label in &labels {
            if label.is_empty() || label.len() > 63 {
                return false;
            }

            if !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
                return false;
            }

            if label.starts_with('-') || label.ends_with('-') {
                return false;
            }
        }

        match labels.last() {
            Some(tld) => tld.len() >= 2 && tld.chars().all(|c| c.is_ascii_alphabetic()),
            None => false,
        }
    }
}

/// Canonicalizes user input into a [`NormalizedDomain`].
///
/// Order matters: trim, lowercase, drop `scheme://`, cut at the first `/`, `?`
/// or `#`, drop `:port`, drop trailing dots, then validate.
///
/// ```
/// use cmsprobe::validation::normalize_domain;
///
/// let domain = normalize_domain("HTTPS://Example.com/path?q=1").unwrap();
/// assert_eq!(domain.as_str(), "example.com");
/// assert!(normalize_domain("not a domain").is_err());
/// ```
pub fn normalize_domain(raw: &str) -> Result<NormalizedDomain, DetectError> {
    let lowered = raw.trim().to_lowercase();

    let without_scheme = match lowered.split_once("://") {
        Some((_, rest)) => rest,
        None => lowered.as_str(),
    };

    let host_port = without_scheme
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default();
    let host = host_port.split(':').next().unwrap_or_default();
    let host = host.trim_end_matches('.');

    if !DomainValidator::new().validate_domain_format(host) {
        return Err(DetectError::InvalidDomain(host.to_string()));
    }

    Ok(NormalizedDomain(host.to_string()))
}
