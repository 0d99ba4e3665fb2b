//! `portcullis-identity`: identity aggregates and secret handling.
//!
//! Pure domain: human users, organizations and the instance defaults they fall
//! back to, plus the capability traits (hashing, encryption, code and id
//! generation) commands are given from outside.

pub mod crypto;
pub mod instance;
pub mod org;
pub mod policy;
pub mod user;

pub use crypto::{
    BcryptPasswordHasher, CodeGenerator, CryptoType, CryptoValue, EncryptionAlgorithm, GeneratedCode,
    IdGenerator, PasswordHasher, RandomCodeGenerator, SecretGeneratorConfig, SecretGeneratorsConfig,
    SecretKind, UuidIdGenerator, verify_code,
};
pub use instance::{Instance, InstanceCommand, InstanceEvent};
pub use org::{DomainChange, DomainClaims, Org, OrgCommand, OrgEvent, VerifyDomain, normalize_domain};
pub use policy::{DomainPolicy, PasswordComplexityPolicy, PolicySet};
pub use user::{
    ContactChange, ContactUpdate, EmailSetup, EmailSetupKind, Gender, HumanChanges, HumanUser, IssuedCode,
    NewHuman, NewPassword, NewPhone, PendingCode, PhoneSetup, Profile, ProfileChanges, UserCommand, UserEvent,
    UserState,
};
