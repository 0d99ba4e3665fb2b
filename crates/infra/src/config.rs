//! Configuration loading and representation.

use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;

use portcullis_identity::{
    BcryptPasswordHasher, RandomCodeGenerator, SecretGeneratorsConfig, SecretKind, UuidIdGenerator,
};

use crate::commands::Capabilities;

pub const ENV_PASSWORD_HASH_COST: &str = "PORTCULLIS_PASSWORD_HASH_COST";
pub const ENV_CODE_LENGTH: &str = "PORTCULLIS_CODE_LENGTH";
pub const ENV_CODE_EXPIRY_SECS: &str = "PORTCULLIS_CODE_EXPIRY_SECS";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },

    #[error("invalid configuration document: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("{0}")]
    Invalid(String),
}

/// Settings of the identity command side.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// bcrypt cost factor.
    pub password_hash_cost: u32,
    pub secrets: SecretGeneratorsConfig,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            password_hash_cost: 10,
            secrets: SecretGeneratorsConfig::default(),
        }
    }
}

impl IdentityConfig {
    /// Defaults overridden by `PORTCULLIS_*` environment variables.
    ///
    /// Code length and expiry apply to every kind of generated code.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut cfg = Self::default();

        if let Some(cost) = parse(&lookup, ENV_PASSWORD_HASH_COST)? {
            cfg.password_hash_cost = cost;
        }
        let length: Option<usize> = parse(&lookup, ENV_CODE_LENGTH)?;
        let expiry: Option<u64> = parse(&lookup, ENV_CODE_EXPIRY_SECS)?;
        for kind in [
            SecretKind::InitCode,
            SecretKind::EmailVerificationCode,
            SecretKind::PhoneVerificationCode,
            SecretKind::PasswordResetCode,
        ] {
            let generator = cfg.secrets.for_kind_mut(kind);
            if let Some(length) = length {
                generator.length = length;
            }
            if let Some(expiry) = expiry {
                generator.expiry_secs = expiry;
            }
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_json(document: &str) -> Result<Self, ConfigError> {
        let cfg: Self = serde_json::from_str(document)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        // bcrypt accepts costs 4..=31.
        if !(4..=31).contains(&self.password_hash_cost) {
            return Err(ConfigError::Invalid(format!(
                "password_hash_cost must be within 4..=31, got {}",
                self.password_hash_cost
            )));
        }
        for kind in [
            SecretKind::InitCode,
            SecretKind::EmailVerificationCode,
            SecretKind::PhoneVerificationCode,
            SecretKind::PasswordResetCode,
        ] {
            let generator = self.secrets.for_kind(kind);
            if generator.length == 0 {
                return Err(ConfigError::Invalid(format!("{kind:?} length must be positive")));
            }
            if !(generator.include_lower_letters
                || generator.include_upper_letters
                || generator.include_digits
                || generator.include_symbols)
            {
                return Err(ConfigError::Invalid(format!("{kind:?} has no character classes")));
            }
        }
        Ok(())
    }

    /// Default capability bundle: bcrypt hashing, random codes, UUIDv7 ids.
    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            password_hasher: Arc::new(BcryptPasswordHasher::new(self.password_hash_cost)),
            code_generator: Arc::new(RandomCodeGenerator::new(self.secrets.clone())),
            id_generator: Arc::new(UuidIdGenerator),
        }
    }
}

fn parse<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { key, value: raw }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn env_overrides_apply_to_every_code_kind() {
        let cfg = IdentityConfig::from_lookup(lookup(&[
            (ENV_PASSWORD_HASH_COST, "6"),
            (ENV_CODE_LENGTH, "8"),
            (ENV_CODE_EXPIRY_SECS, "120"),
        ]))
        .unwrap();

        assert_eq!(cfg.password_hash_cost, 6);
        assert_eq!(cfg.secrets.init_code.length, 8);
        assert_eq!(cfg.secrets.password_reset_code.expiry_secs, 120);
    }

    #[test]
    fn garbage_values_are_reported() {
        let err = IdentityConfig::from_lookup(lookup(&[(ENV_CODE_LENGTH, "six")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: ENV_CODE_LENGTH, .. }));

        let err = IdentityConfig::from_lookup(lookup(&[(ENV_PASSWORD_HASH_COST, "2")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn json_document_fills_missing_fields_with_defaults() {
        let cfg = IdentityConfig::from_json(r#"{"secrets": {"init_code": {"length": 10}}}"#).unwrap();
        assert_eq!(cfg.password_hash_cost, 10);
        assert_eq!(cfg.secrets.init_code.length, 10);
        assert!(cfg.secrets.init_code.include_digits);
        assert_eq!(cfg.secrets.email_verification_code, SecretGeneratorsConfig::default().email_verification_code);
    }
}
