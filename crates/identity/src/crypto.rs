//! Secret handling capabilities: password hashing, reversible encryption of
//! one-time codes, code generation and id generation.
//!
//! Commands receive these as trait objects. Nothing here is global.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use portcullis_core::{DomainError, DomainResult};

// ─────────────────────────────────────────────────────────────────────────────
// Crypto values
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CryptoType {
    Encryption,
    Hash,
}

/// An encrypted or hashed secret as stored in events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CryptoValue {
    pub crypto_type: CryptoType,
    pub algorithm: String,
    pub key_id: String,
    pub crypted: Vec<u8>,
}

/// Reversible encryption used for one-time codes.
///
/// The primitive itself is provided by the host.
pub trait EncryptionAlgorithm: Send + Sync {
    fn algorithm(&self) -> &str;

    fn key_id(&self) -> &str;

    fn encrypt(&self, value: &[u8]) -> DomainResult<CryptoValue>;

    fn decrypt(&self, value: &CryptoValue) -> DomainResult<String>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Password hashing
// ─────────────────────────────────────────────────────────────────────────────

pub trait PasswordHasher: Send + Sync {
    /// Hash a plaintext password into its encoded form.
    fn hash(&self, password: &str) -> DomainResult<String>;

    /// Check a plaintext password against an encoded hash.
    fn verify(&self, password: &str, encoded: &str) -> DomainResult<bool>;

    /// Whether an externally produced encoded hash can be verified later.
    fn is_supported(&self, encoded: &str) -> bool;
}

/// bcrypt-backed [`PasswordHasher`].
#[derive(Debug, Clone, Copy)]
pub struct BcryptPasswordHasher {
    cost: u32,
}

impl BcryptPasswordHasher {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }
}

impl Default for BcryptPasswordHasher {
    fn default() -> Self {
        Self::new(bcrypt::DEFAULT_COST)
    }
}

impl PasswordHasher for BcryptPasswordHasher {
    fn hash(&self, password: &str) -> DomainResult<String> {
        bcrypt::hash(password, self.cost).map_err(|e| {
            DomainError::internal("CRYPTO-HASH-01", "Errors.Internal", format!("bcrypt hash failed: {e}"))
        })
    }

    fn verify(&self, password: &str, encoded: &str) -> DomainResult<bool> {
        bcrypt::verify(password, encoded).map_err(|e| {
            DomainError::internal("CRYPTO-HASH-02", "Errors.Internal", format!("bcrypt verify failed: {e}"))
        })
    }

    fn is_supported(&self, encoded: &str) -> bool {
        ["$2a$", "$2b$", "$2x$", "$2y$"]
            .iter()
            .any(|prefix| encoded.starts_with(prefix))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// One-time codes
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SecretKind {
    InitCode,
    EmailVerificationCode,
    PhoneVerificationCode,
    PasswordResetCode,
}

/// Shape and lifetime of one kind of generated code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecretGeneratorConfig {
    pub length: usize,
    pub expiry_secs: u64,
    pub include_lower_letters: bool,
    pub include_upper_letters: bool,
    pub include_digits: bool,
    pub include_symbols: bool,
}

impl Default for SecretGeneratorConfig {
    fn default() -> Self {
        Self {
            length: 6,
            expiry_secs: 60 * 60,
            include_lower_letters: false,
            include_upper_letters: true,
            include_digits: true,
            include_symbols: false,
        }
    }
}

impl SecretGeneratorConfig {
    fn alphabet(&self) -> Vec<u8> {
        let mut chars = Vec::new();
        if self.include_lower_letters {
            chars.extend(b'a'..=b'z');
        }
        if self.include_upper_letters {
            chars.extend(b'A'..=b'Z');
        }
        if self.include_digits {
            chars.extend(b'0'..=b'9');
        }
        if self.include_symbols {
            chars.extend(b"~!@#$^&*()_+`-={}|[]:<>?,./");
        }
        chars
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecretGeneratorsConfig {
    pub init_code: SecretGeneratorConfig,
    pub email_verification_code: SecretGeneratorConfig,
    pub phone_verification_code: SecretGeneratorConfig,
    pub password_reset_code: SecretGeneratorConfig,
}

impl Default for SecretGeneratorsConfig {
    fn default() -> Self {
        Self {
            init_code: SecretGeneratorConfig {
                expiry_secs: 72 * 60 * 60,
                ..Default::default()
            },
            email_verification_code: SecretGeneratorConfig::default(),
            phone_verification_code: SecretGeneratorConfig {
                include_upper_letters: false,
                ..Default::default()
            },
            password_reset_code: SecretGeneratorConfig::default(),
        }
    }
}

impl SecretGeneratorsConfig {
    pub fn for_kind(&self, kind: SecretKind) -> &SecretGeneratorConfig {
        match kind {
            SecretKind::InitCode => &self.init_code,
            SecretKind::EmailVerificationCode => &self.email_verification_code,
            SecretKind::PhoneVerificationCode => &self.phone_verification_code,
            SecretKind::PasswordResetCode => &self.password_reset_code,
        }
    }

    pub fn for_kind_mut(&mut self, kind: SecretKind) -> &mut SecretGeneratorConfig {
        match kind {
            SecretKind::InitCode => &mut self.init_code,
            SecretKind::EmailVerificationCode => &mut self.email_verification_code,
            SecretKind::PhoneVerificationCode => &mut self.phone_verification_code,
            SecretKind::PasswordResetCode => &mut self.password_reset_code,
        }
    }
}

/// A freshly generated code: the encrypted form goes into the event, the
/// plaintext may be handed back to the caller.
#[derive(Clone, PartialEq, Eq)]
pub struct GeneratedCode {
    pub crypted: CryptoValue,
    pub plain: String,
    pub expiry: Duration,
}

impl core::fmt::Debug for GeneratedCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("GeneratedCode")
            .field("crypted", &self.crypted)
            .field("plain", &"<redacted>")
            .field("expiry", &self.expiry)
            .finish()
    }
}

pub trait CodeGenerator: Send + Sync {
    fn generate(&self, kind: SecretKind, alg: &dyn EncryptionAlgorithm) -> DomainResult<GeneratedCode>;
}

/// [`CodeGenerator`] drawing characters from the thread-local RNG.
#[derive(Debug, Clone, Default)]
pub struct RandomCodeGenerator {
    config: SecretGeneratorsConfig,
}

impl RandomCodeGenerator {
    pub fn new(config: SecretGeneratorsConfig) -> Self {
        Self { config }
    }
}

impl CodeGenerator for RandomCodeGenerator {
    fn generate(&self, kind: SecretKind, alg: &dyn EncryptionAlgorithm) -> DomainResult<GeneratedCode> {
        let cfg = self.config.for_kind(kind);
        let alphabet = cfg.alphabet();
        if alphabet.is_empty() || cfg.length == 0 {
            return Err(DomainError::internal(
                "CODE-GEN-01",
                "Errors.Internal",
                format!("secret generator for {kind:?} produces empty codes"),
            ));
        }

        let mut rng = rand::thread_rng();
        let plain: String = (0..cfg.length)
            .map(|_| char::from(alphabet[rng.gen_range(0..alphabet.len())]))
            .collect();

        Ok(GeneratedCode {
            crypted: alg.encrypt(plain.as_bytes())?,
            plain,
            expiry: Duration::from_secs(cfg.expiry_secs),
        })
    }
}

/// Check a user-supplied code against a stored one.
///
/// Expiry is measured from `created_at`, the date of the event that stored the
/// code.
pub fn verify_code(
    stored: &CryptoValue,
    created_at: DateTime<Utc>,
    expiry_secs: u64,
    given: &str,
    alg: &dyn EncryptionAlgorithm,
    now: DateTime<Utc>,
) -> DomainResult<()> {
    let expires_at = i64::try_from(expiry_secs)
        .ok()
        .and_then(|secs| created_at.checked_add_signed(chrono::Duration::seconds(secs)));
    if expires_at.is_none_or(|at| now > at) {
        return Err(DomainError::precondition("CODE-QvUQ4P", "Errors.User.Code.Expired"));
    }
    let expected = alg.decrypt(stored)?;
    if !bool::from(expected.as_bytes().ct_eq(given.as_bytes())) {
        return Err(DomainError::invalid_argument("CODE-woT0xc", "Errors.User.Code.Invalid"));
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Ids
// ─────────────────────────────────────────────────────────────────────────────

pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> String;
}

/// Time-ordered UUIDv7 ids.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidIdGenerator;

impl IdGenerator for UuidIdGenerator {
    fn next_id(&self) -> String {
        uuid::Uuid::now_v7().to_string()
    }
}

/// Deterministic doubles for tests of this crate and its dependents.
#[cfg(any(test, feature = "testing"))]
pub mod testing {
    use super::*;

    /// Reversible "encryption" that stores the plaintext bytes.
    #[derive(Debug, Default)]
    pub struct PlainEncryption;

    impl EncryptionAlgorithm for PlainEncryption {
        fn algorithm(&self) -> &str {
            "enc"
        }

        fn key_id(&self) -> &str {
            "id"
        }

        fn encrypt(&self, value: &[u8]) -> DomainResult<CryptoValue> {
            Ok(CryptoValue {
                crypto_type: CryptoType::Encryption,
                algorithm: "enc".to_string(),
                key_id: "id".to_string(),
                crypted: value.to_vec(),
            })
        }

        fn decrypt(&self, value: &CryptoValue) -> DomainResult<String> {
            String::from_utf8(value.crypted.clone())
                .map_err(|e| DomainError::internal("TEST-DEC", "Errors.Internal", e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use portcullis_core::ErrorKind;

    use super::testing::PlainEncryption;
    use super::*;

    #[test]
    fn random_codes_follow_the_configured_alphabet() {
        let generator = RandomCodeGenerator::default();
        let code = generator
            .generate(SecretKind::PhoneVerificationCode, &PlainEncryption)
            .unwrap();

        assert_eq!(code.plain.len(), 6);
        assert!(code.plain.chars().all(|c| c.is_ascii_digit()));
        assert_eq!(code.crypted.crypted, code.plain.as_bytes());
        assert_eq!(code.expiry, Duration::from_secs(3600));
    }

    #[test]
    fn empty_alphabet_is_rejected() {
        let mut config = SecretGeneratorsConfig::default();
        *config.for_kind_mut(SecretKind::InitCode) = SecretGeneratorConfig {
            include_upper_letters: false,
            include_digits: false,
            ..Default::default()
        };
        let err = RandomCodeGenerator::new(config)
            .generate(SecretKind::InitCode, &PlainEncryption)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[test]
    fn code_verification_checks_expiry_then_value() {
        let stored = PlainEncryption.encrypt(b"ABC123").unwrap();
        let created = Utc::now() - chrono::Duration::minutes(30);

        assert!(verify_code(&stored, created, 3600, "ABC123", &PlainEncryption, Utc::now()).is_ok());

        let err = verify_code(&stored, created, 3600, "nope", &PlainEncryption, Utc::now()).unwrap_err();
        assert_eq!(err.message_key(), "Errors.User.Code.Invalid");

        for given in ["ABC12", "ABC1234", "abc123", ""] {
            let err = verify_code(&stored, created, 3600, given, &PlainEncryption, Utc::now()).unwrap_err();
            assert_eq!(err.message_key(), "Errors.User.Code.Invalid", "{given:?}");
        }

        let err = verify_code(&stored, created, 60, "ABC123", &PlainEncryption, Utc::now()).unwrap_err();
        assert_eq!(err.message_key(), "Errors.User.Code.Expired");
    }

    #[test]
    fn bcrypt_round_trip_and_support_detection() {
        let hasher = BcryptPasswordHasher::new(4);
        let encoded = hasher.hash("Secret1!").unwrap();
        assert!(hasher.is_supported(&encoded));
        assert!(hasher.verify("Secret1!", &encoded).unwrap());
        assert!(!hasher.verify("secret1!", &encoded).unwrap());
        assert!(!hasher.is_supported("$plain$x$password"));
    }

    #[test]
    fn uuid_ids_are_unique() {
        let ids = UuidIdGenerator;
        assert_ne!(ids.next_id(), ids.next_id());
    }
}
