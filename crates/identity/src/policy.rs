//! Login/domain and password complexity policies.
//!
//! Policies live on an org and, as defaults, on the instance. Commands resolve
//! the org policy first and fall back to the instance default.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use portcullis_core::{DomainError, DomainResult};

/// Event payload: a policy was set to `policy`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicySet<P> {
    pub policy: P,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DomainPolicy {
    pub user_login_must_be_domain: bool,
    pub validate_org_domains: bool,
    pub smtp_sender_address_matches_instance_domain: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordComplexityPolicy {
    pub min_length: u64,
    pub has_lowercase: bool,
    pub has_uppercase: bool,
    pub has_number: bool,
    pub has_symbol: bool,
}

impl Default for PasswordComplexityPolicy {
    fn default() -> Self {
        Self {
            min_length: 8,
            has_lowercase: true,
            has_uppercase: true,
            has_number: true,
            has_symbol: true,
        }
    }
}

impl PasswordComplexityPolicy {
    /// Check a plaintext password. The first violated rule is reported.
    pub fn check(&self, password: &str) -> DomainResult<()> {
        if (password.chars().count() as u64) < self.min_length {
            return Err(DomainError::invalid_argument(
                "DOMAIN-HuJf6",
                "Errors.User.PasswordComplexityPolicy.MinLength",
            ));
        }
        if self.has_lowercase && !password.chars().any(char::is_lowercase) {
            return Err(DomainError::invalid_argument(
                "DOMAIN-co3Xw",
                "Errors.User.PasswordComplexityPolicy.HasLower",
            ));
        }
        if self.has_uppercase && !password.chars().any(char::is_uppercase) {
            return Err(DomainError::invalid_argument(
                "DOMAIN-VoaRj",
                "Errors.User.PasswordComplexityPolicy.HasUpper",
            ));
        }
        if self.has_number && !password.chars().any(|c| c.is_ascii_digit()) {
            return Err(DomainError::invalid_argument(
                "DOMAIN-ZBv4H",
                "Errors.User.PasswordComplexityPolicy.HasNumber",
            ));
        }
        if self.has_symbol && !password.chars().any(is_symbol) {
            return Err(DomainError::invalid_argument(
                "DOMAIN-ZDLwA",
                "Errors.User.PasswordComplexityPolicy.HasSymbol",
            ));
        }
        Ok(())
    }
}

fn is_symbol(c: char) -> bool {
    !c.is_alphanumeric() && !c.is_whitespace()
}
