//! Human user commands.

use serde_json::Value as JsonValue;

use portcullis_core::{AggregateId, DomainError, DomainResult, InstanceId, ObjectDetails, OrgId, UserId};
use portcullis_events::{EventBus, EventEnvelope};
use portcullis_identity::{
    ContactChange, EmailSetup, EmailSetupKind, EncryptionAlgorithm, Gender, HumanChanges, HumanUser, IssuedCode,
    NewHuman, NewPassword, NewPhone, PhoneSetup, Profile, ProfileChanges, SecretKind, UserCommand, UserState, user,
    verify_code,
};

use super::{Commands, now, require_scope};
use crate::command_dispatcher::StreamTarget;
use crate::event_store::EventStore;

// ─────────────────────────────────────────────────────────────────────────────
// Intents
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Email {
    pub address: String,
    pub verified: bool,
    /// Hand the generated verification code back to the caller.
    pub return_code: bool,
    pub url_template: Option<String>,
}

/// An empty `number` means no phone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Phone {
    pub number: String,
    pub verified: bool,
    pub return_code: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddMetadataEntry {
    pub key: String,
    pub value: Vec<u8>,
}

/// Intent to add a human user. `id`, `details` and the returned codes are
/// filled in by [`Commands::add_user_human`].
#[derive(Clone, Default)]
pub struct AddHuman {
    pub id: Option<UserId>,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub nick_name: String,
    pub display_name: String,
    pub preferred_language: String,
    pub gender: Gender,
    pub email: Email,
    pub phone: Phone,
    pub password: Option<String>,
    pub encoded_password_hash: Option<String>,
    pub password_change_required: bool,
    pub metadata: Vec<AddMetadataEntry>,

    pub details: Option<ObjectDetails>,
    pub email_code: Option<String>,
    pub phone_code: Option<String>,
}

impl core::fmt::Debug for AddHuman {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AddHuman")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("email", &self.email)
            .field("phone", &self.phone)
            .field("has_password", &self.password.is_some())
            .field("has_encoded_password", &self.encoded_password_hash.is_some())
            .field("metadata", &self.metadata.len())
            .field("details", &self.details)
            .finish_non_exhaustive()
    }
}

impl AddHuman {
    fn normalize(&mut self) {
        self.username = self.username.trim().to_string();
        self.first_name = self.first_name.trim().to_string();
        self.last_name = self.last_name.trim().to_string();
        self.nick_name = self.nick_name.trim().to_string();
        self.display_name = self.display_name.trim().to_string();
        self.email.address = self.email.address.trim().to_string();
        self.phone.number = self.phone.number.trim().to_string();
        self.password = non_empty(self.password.take());
        self.encoded_password_hash = non_empty(self.encoded_password_hash.take());
        if self.display_name.is_empty() {
            self.display_name = format!("{} {}", self.first_name, self.last_name);
        }
    }

    fn validate(&mut self) -> DomainResult<()> {
        if self.username.is_empty() {
            return Err(DomainError::invalid_argument("COMMAND-zzad3", "Errors.User.Username.Empty"));
        }
        if self.first_name.is_empty() {
            return Err(DomainError::invalid_argument("USER-UCej2", "Errors.User.Profile.FirstNameEmpty"));
        }
        if self.last_name.is_empty() {
            return Err(DomainError::invalid_argument("USER-4hB7d", "Errors.User.Profile.LastNameEmpty"));
        }
        validate_email(&self.email.address)?;
        if !self.phone.number.is_empty() {
            self.phone.number = normalize_phone(&self.phone.number)?;
        }
        if self.metadata.iter().any(|entry| entry.key.trim().is_empty()) {
            return Err(DomainError::invalid_argument("META-2m00f", "Errors.Metadata.Invalid"));
        }
        if self.password.is_some() && self.encoded_password_hash.is_some() {
            return Err(DomainError::invalid_argument("COMMAND-3M0fsss", "Errors.User.Password.NotSupported"));
        }
        Ok(())
    }

    fn profile(&self) -> Profile {
        Profile {
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            nick_name: self.nick_name.clone(),
            display_name: self.display_name.clone(),
            preferred_language: self.preferred_language.trim().to_string(),
            gender: self.gender,
        }
    }
}

/// New password plus the proof that the caller may set it.
#[derive(Clone, Default)]
pub struct PasswordChange {
    pub password: Option<String>,
    pub encoded_password_hash: Option<String>,
    pub old_password: Option<String>,
    /// Password reset code sent to the user.
    pub password_code: Option<String>,
    pub change_required: bool,
}

impl core::fmt::Debug for PasswordChange {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PasswordChange")
            .field("has_password", &self.password.is_some())
            .field("has_encoded_password", &self.encoded_password_hash.is_some())
            .field("has_old_password", &self.old_password.is_some())
            .field("has_password_code", &self.password_code.is_some())
            .field("change_required", &self.change_required)
            .finish()
    }
}

impl PasswordChange {
    fn normalize(&mut self) {
        self.password = non_empty(self.password.take());
        self.encoded_password_hash = non_empty(self.encoded_password_hash.take());
        self.old_password = non_empty(self.old_password.take());
        self.password_code = non_empty(self.password_code.take());
    }

    fn validate(&self) -> DomainResult<()> {
        match (&self.password, &self.encoded_password_hash) {
            (None, None) => {
                return Err(DomainError::invalid_argument("COMMAND-3M0fs", "Errors.User.Password.Empty"));
            }
            (Some(_), Some(_)) => {
                return Err(DomainError::invalid_argument(
                    "COMMAND-3M0fsss",
                    "Errors.User.Password.NotSupported",
                ));
            }
            _ => {}
        }
        if self.old_password.is_none() && self.password_code.is_none() {
            return Err(DomainError::invalid_argument(
                "COMMAND-3M0fd",
                "Errors.User.Password.VerificationMissing",
            ));
        }
        Ok(())
    }
}

/// Intent to change a human user. Absent sections are left untouched.
#[derive(Debug, Clone, Default)]
pub struct ChangeHuman {
    pub id: UserId,
    pub username: Option<String>,
    pub profile: Option<ProfileChanges>,
    pub email: Option<Email>,
    pub phone: Option<Phone>,
    pub password: Option<PasswordChange>,

    pub details: Option<ObjectDetails>,
    pub email_code: Option<String>,
    pub phone_code: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

impl<S, B> Commands<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Add a human user to `org_id`.
    ///
    /// An unverified email gets an init code when `allow_init_mail` is set and
    /// the caller asked for neither a returned code nor a URL template;
    /// otherwise an email verification code.
    #[tracing::instrument(skip_all, fields(instance_id = %instance_id, org_id = %org_id))]
    pub fn add_user_human(
        &self,
        instance_id: &InstanceId,
        org_id: &OrgId,
        human: &mut AddHuman,
        allow_init_mail: bool,
        code_alg: &dyn EncryptionAlgorithm,
    ) -> DomainResult<ObjectDetails> {
        require_scope(instance_id, org_id)?;
        human.normalize();
        human.validate()?;

        let user_id = match human.id.as_ref().filter(|id| !id.is_missing()) {
            Some(id) => id.clone(),
            None => UserId::new(self.caps.id_generator.next_id()),
        };
        human.id = Some(user_id.clone());

        // Ids are unique across orgs, so existence is checked on the raw stream.
        let loaded = self.dispatcher.load(
            instance_id,
            user::AGGREGATE_TYPE,
            &AggregateId::from(&user_id),
            HumanUser::empty(user_id.clone(), org_id.clone()),
        )?;
        if loaded.exists() {
            return Err(DomainError::already_exists("COMMAND-k2unb", "Errors.User.AlreadyExisting"));
        }

        let domain_policy = self.domain_policy(instance_id, org_id)?;
        self.check_username_domain(instance_id, org_id, &human.username, &domain_policy)?;

        let encoded_password = match (&human.password, &human.encoded_password_hash) {
            (Some(plain), _) => Some(self.hash_new_password(instance_id, org_id, plain)?),
            (None, Some(encoded)) => Some(self.accept_encoded_password(encoded)?),
            (None, None) => None,
        };

        let mut email_code = None;
        let email_setup = match EmailSetupKind::for_new_human(
            human.email.verified,
            human.email.return_code,
            human.email.url_template.is_some(),
            allow_init_mail,
        ) {
            EmailSetupKind::Verified => EmailSetup::Verified,
            EmailSetupKind::Code => {
                let generated = self
                    .caps
                    .code_generator
                    .generate(SecretKind::EmailVerificationCode, code_alg)?;
                if human.email.return_code {
                    email_code = Some(generated.plain.clone());
                }
                EmailSetup::Code(IssuedCode::new(
                    &generated,
                    human.email.url_template.clone(),
                    human.email.return_code,
                ))
            }
            EmailSetupKind::InitCode => {
                let generated = self.caps.code_generator.generate(SecretKind::InitCode, code_alg)?;
                EmailSetup::InitCode(IssuedCode::new(&generated, None, false))
            }
        };

        let mut phone_code = None;
        let phone = if human.phone.number.is_empty() {
            None
        } else if human.phone.verified {
            Some(NewPhone {
                number: human.phone.number.clone(),
                setup: PhoneSetup::Verified,
            })
        } else {
            let generated = self
                .caps
                .code_generator
                .generate(SecretKind::PhoneVerificationCode, code_alg)?;
            if human.phone.return_code {
                phone_code = Some(generated.plain.clone());
            }
            Some(NewPhone {
                number: human.phone.number.clone(),
                setup: PhoneSetup::Code(IssuedCode::new(&generated, None, human.phone.return_code)),
            })
        };

        let command = UserCommand::AddHuman(Box::new(NewHuman {
            username: human.username.clone(),
            profile: human.profile(),
            email: human.email.address.clone(),
            email_setup,
            phone,
            encoded_password,
            password_change_required: human.password_change_required,
            metadata: human
                .metadata
                .iter()
                .map(|entry| (entry.key.trim().to_string(), entry.value.clone()))
                .collect(),
            occurred_at: now(),
        }));

        let target = StreamTarget::new(instance_id, &user_id, user::AGGREGATE_TYPE, org_id);
        let details = self.commit(&target, &loaded, &command)?;

        human.details = Some(details.clone());
        human.email_code = email_code;
        human.phone_code = phone_code;
        Ok(details)
    }

    /// Apply the supplied changes to a human user. Nothing is appended when
    /// every supplied value equals the current one.
    #[tracing::instrument(skip_all, fields(instance_id = %instance_id, org_id = %org_id, user_id = %human.id))]
    pub fn change_user_human(
        &self,
        instance_id: &InstanceId,
        org_id: &OrgId,
        human: &mut ChangeHuman,
        code_alg: &dyn EncryptionAlgorithm,
    ) -> DomainResult<ObjectDetails> {
        require_scope(instance_id, org_id)?;
        require_user_id(&human.id)?;
        if let Some(password) = human.password.as_mut() {
            password.normalize();
            password.validate()?;
        }
        if let Some(profile) = human.profile.as_ref() {
            validate_profile_changes(profile)?;
        }
        if let Some(email) = human.email.as_mut() {
            email.address = email.address.trim().to_string();
            if !email.address.is_empty() {
                validate_email(&email.address)?;
            }
        }
        if let Some(phone) = human.phone.as_mut() {
            phone.number = phone.number.trim().to_string();
            if !phone.number.is_empty() {
                phone.number = normalize_phone(&phone.number)?;
            }
        }

        let loaded = self.load_user(instance_id, org_id, &human.id)?;
        let user = &loaded.aggregate;
        if !user.exists() {
            return Err(DomainError::not_found("COMMAND-k2unb", "Errors.User.NotFound"));
        }

        let mut username = None;
        if let Some(requested) = &human.username {
            if user.username_differs(requested) {
                let requested = requested.trim();
                if requested.is_empty() {
                    return Err(DomainError::invalid_argument("COMMAND-zzad3", "Errors.User.Username.Empty"));
                }
                let policy = self.domain_policy(instance_id, org_id)?;
                self.check_username_domain(instance_id, org_id, requested, &policy)?;
                username = Some(requested.to_string());
            }
        }

        let mut email_code = None;
        let email = match &human.email {
            Some(email) => {
                let update = user.email_update(&email.address, email.verified);
                let code = if update.needs_code() {
                    let generated = self
                        .caps
                        .code_generator
                        .generate(SecretKind::EmailVerificationCode, code_alg)?;
                    if email.return_code {
                        email_code = Some(generated.plain.clone());
                    }
                    Some(IssuedCode::new(&generated, email.url_template.clone(), email.return_code))
                } else {
                    None
                };
                Some(ContactChange {
                    value: email.address.clone(),
                    verified: email.verified,
                    code,
                })
            }
            None => None,
        };

        let mut phone_code = None;
        let phone = match &human.phone {
            Some(phone) => {
                let update = user.phone_update(&phone.number, phone.verified);
                let code = if update.needs_code() {
                    let generated = self
                        .caps
                        .code_generator
                        .generate(SecretKind::PhoneVerificationCode, code_alg)?;
                    if phone.return_code {
                        phone_code = Some(generated.plain.clone());
                    }
                    Some(IssuedCode::new(&generated, None, phone.return_code))
                } else {
                    None
                };
                Some(ContactChange {
                    value: phone.number.clone(),
                    verified: phone.verified,
                    code,
                })
            }
            None => None,
        };

        let password = match &human.password {
            Some(change) => Some(self.prepare_password_change(instance_id, org_id, user, change, code_alg)?),
            None => None,
        };

        let command = UserCommand::ChangeHuman(Box::new(HumanChanges {
            username,
            profile: human.profile.clone(),
            email,
            phone,
            password,
            occurred_at: now(),
        }));

        let target = StreamTarget::new(instance_id, &human.id, user::AGGREGATE_TYPE, org_id);
        let details = self.commit(&target, &loaded, &command)?;

        human.details = Some(details.clone());
        human.email_code = email_code;
        human.phone_code = phone_code;
        Ok(details)
    }

    #[tracing::instrument(skip(self))]
    pub fn lock_user_human(
        &self,
        instance_id: &InstanceId,
        org_id: &OrgId,
        user_id: &UserId,
    ) -> DomainResult<ObjectDetails> {
        self.change_user_state(instance_id, org_id, user_id, UserCommand::Lock { occurred_at: now() })
    }

    #[tracing::instrument(skip(self))]
    pub fn unlock_user_human(
        &self,
        instance_id: &InstanceId,
        org_id: &OrgId,
        user_id: &UserId,
    ) -> DomainResult<ObjectDetails> {
        self.change_user_state(instance_id, org_id, user_id, UserCommand::Unlock { occurred_at: now() })
    }

    #[tracing::instrument(skip(self))]
    pub fn deactivate_user_human(
        &self,
        instance_id: &InstanceId,
        org_id: &OrgId,
        user_id: &UserId,
    ) -> DomainResult<ObjectDetails> {
        self.change_user_state(instance_id, org_id, user_id, UserCommand::Deactivate { occurred_at: now() })
    }

    #[tracing::instrument(skip(self))]
    pub fn reactivate_user_human(
        &self,
        instance_id: &InstanceId,
        org_id: &OrgId,
        user_id: &UserId,
    ) -> DomainResult<ObjectDetails> {
        self.change_user_state(instance_id, org_id, user_id, UserCommand::Reactivate { occurred_at: now() })
    }

    /// Issue a password reset code. Returns the plaintext code only when
    /// `return_code` is set.
    #[tracing::instrument(skip(self, code_alg))]
    pub fn request_password_reset(
        &self,
        instance_id: &InstanceId,
        org_id: &OrgId,
        user_id: &UserId,
        return_code: bool,
        url_template: Option<String>,
        code_alg: &dyn EncryptionAlgorithm,
    ) -> DomainResult<(ObjectDetails, Option<String>)> {
        require_scope(instance_id, org_id)?;
        require_user_id(user_id)?;

        let loaded = self.load_user(instance_id, org_id, user_id)?;
        loaded.aggregate.ensure_password_changeable()?;

        let generated = self.caps.code_generator.generate(SecretKind::PasswordResetCode, code_alg)?;
        let command = UserCommand::RequestPasswordReset {
            code: IssuedCode::new(&generated, url_template, return_code),
            occurred_at: now(),
        };

        let target = StreamTarget::new(instance_id, user_id, user::AGGREGATE_TYPE, org_id);
        let details = self.commit(&target, &loaded, &command)?;
        Ok((details, return_code.then_some(generated.plain)))
    }

    /// Confirm the init code of a user in `Initial` state, activating it.
    #[tracing::instrument(skip(self, code, code_alg))]
    pub fn verify_init_code(
        &self,
        instance_id: &InstanceId,
        org_id: &OrgId,
        user_id: &UserId,
        code: &str,
        code_alg: &dyn EncryptionAlgorithm,
    ) -> DomainResult<ObjectDetails> {
        require_scope(instance_id, org_id)?;
        require_user_id(user_id)?;

        let loaded = self.load_user(instance_id, org_id, user_id)?;
        let user = &loaded.aggregate;
        if !user.exists() {
            return Err(DomainError::not_found("COMMAND-k2unb", "Errors.User.NotFound"));
        }
        if user.state != UserState::Initial {
            return Err(DomainError::precondition("COMMAND-gS32h", "Errors.User.AlreadyInitialised"));
        }
        let pending = user
            .init_code
            .as_ref()
            .ok_or_else(|| DomainError::precondition("COMMAND-mkM9f", "Errors.User.Code.NotFound"))?;
        verify_code(&pending.code, pending.created_at, pending.expiry_secs, code, code_alg, now())?;

        let target = StreamTarget::new(instance_id, user_id, user::AGGREGATE_TYPE, org_id);
        self.commit(&target, &loaded, &UserCommand::CompleteInitialization { occurred_at: now() })
    }

    fn change_user_state(
        &self,
        instance_id: &InstanceId,
        org_id: &OrgId,
        user_id: &UserId,
        command: UserCommand,
    ) -> DomainResult<ObjectDetails> {
        require_scope(instance_id, org_id)?;
        require_user_id(user_id)?;

        let loaded = self.load_user(instance_id, org_id, user_id)?;
        let target = StreamTarget::new(instance_id, user_id, user::AGGREGATE_TYPE, org_id);
        self.commit(&target, &loaded, &command)
    }

    fn hash_new_password(&self, instance_id: &InstanceId, org_id: &OrgId, plain: &str) -> DomainResult<String> {
        self.password_complexity_policy(instance_id, org_id)?.check(plain)?;
        self.caps.password_hasher.hash(plain)
    }

    fn accept_encoded_password(&self, encoded: &str) -> DomainResult<String> {
        if !self.caps.password_hasher.is_supported(encoded) {
            return Err(DomainError::invalid_argument(
                "COMMAND-7hd7k",
                "Errors.User.Password.NotSupported",
            ));
        }
        Ok(encoded.to_string())
    }

    /// Checks order: initialised user, complexity, proof (old password or
    /// reset code).
    fn prepare_password_change(
        &self,
        instance_id: &InstanceId,
        org_id: &OrgId,
        user: &HumanUser,
        change: &PasswordChange,
        code_alg: &dyn EncryptionAlgorithm,
    ) -> DomainResult<NewPassword> {
        user.ensure_password_changeable()?;

        let encoded_password = match (&change.password, &change.encoded_password_hash) {
            (Some(plain), _) => self.hash_new_password(instance_id, org_id, plain)?,
            (None, Some(encoded)) => self.accept_encoded_password(encoded)?,
            (None, None) => {
                return Err(DomainError::invalid_argument("COMMAND-3M0fs", "Errors.User.Password.Empty"));
            }
        };

        if let Some(old) = &change.old_password {
            let current = user.encoded_password.as_deref().unwrap_or_default();
            if current.is_empty() || !self.caps.password_hasher.verify(old, current)? {
                return Err(DomainError::invalid_argument("COMMAND-3M0fd", "Errors.User.Password.Invalid"));
            }
        } else if let Some(code) = &change.password_code {
            let pending = user
                .password_code
                .as_ref()
                .ok_or_else(|| DomainError::precondition("COMMAND-2M9fs", "Errors.User.Code.NotFound"))?;
            verify_code(&pending.code, pending.created_at, pending.expiry_secs, code, code_alg, now())?;
        }

        Ok(NewPassword {
            encoded_password,
            change_required: change.change_required,
        })
    }
}

fn require_user_id(user_id: &UserId) -> DomainResult<()> {
    if user_id.is_missing() {
        return Err(DomainError::invalid_argument("COMMAND-2M0sd", "Errors.User.UserIDMissing"));
    }
    Ok(())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Supplied names must stay non-empty; absent ones are left untouched.
fn validate_profile_changes(profile: &ProfileChanges) -> DomainResult<()> {
    let blank = |value: &Option<String>| value.as_deref().is_some_and(|v| v.trim().is_empty());
    if blank(&profile.first_name) {
        return Err(DomainError::invalid_argument("USER-UCej2", "Errors.User.Profile.FirstNameEmpty"));
    }
    if blank(&profile.last_name) {
        return Err(DomainError::invalid_argument("USER-4hB7d", "Errors.User.Profile.LastNameEmpty"));
    }
    Ok(())
}

fn validate_email(address: &str) -> DomainResult<()> {
    if address.is_empty() {
        return Err(DomainError::invalid_argument("EMAIL-spblu", "Errors.User.Email.Empty"));
    }
    let valid = match address.rsplit_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !address.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if !valid {
        return Err(DomainError::invalid_argument("EMAIL-599BI", "Errors.User.Email.Invalid"));
    }
    Ok(())
}

/// Strips spaces and dashes; keeps a leading `+`.
fn normalize_phone(number: &str) -> DomainResult<String> {
    let compact: String = number.chars().filter(|c| !matches!(c, ' ' | '-')).collect();
    let digits = compact.strip_prefix('+').unwrap_or(&compact);
    if digits.len() < 5 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(DomainError::invalid_argument("PHONE-so0wa", "Errors.User.Phone.Invalid"));
    }
    Ok(compact)
}

#[cfg(test)]
mod tests {
    use portcullis_core::ErrorKind;
    use portcullis_identity::{DomainPolicy, PasswordComplexityPolicy};

    use super::*;
    use crate::commands::testing::{Bus, PlainEncryption, TestCommands, commands};
    use crate::event_store::InMemoryEventStore;

    fn inst() -> InstanceId {
        InstanceId::new("instance1")
    }

    fn org() -> OrgId {
        OrgId::new("org1")
    }

    fn user1() -> UserId {
        UserId::new("user1")
    }

    fn event_types(store: &InMemoryEventStore) -> Vec<String> {
        store
            .load_stream(&inst(), user::AGGREGATE_TYPE, &AggregateId::new("user1"))
            .unwrap()
            .into_iter()
            .map(|e| e.event_type)
            .collect()
    }

    fn with_policies(ids: &[&str]) -> (TestCommands, std::sync::Arc<InMemoryEventStore>, Bus) {
        let (cmds, store, bus) = commands(ids);
        cmds.set_default_domain_policy(
            &inst(),
            DomainPolicy {
                user_login_must_be_domain: true,
                ..Default::default()
            },
        )
        .unwrap();
        cmds.set_default_password_complexity_policy(
            &inst(),
            PasswordComplexityPolicy {
                min_length: 1,
                has_lowercase: false,
                has_uppercase: false,
                has_number: false,
                has_symbol: false,
            },
        )
        .unwrap();
        (cmds, store, bus)
    }

    fn human() -> AddHuman {
        AddHuman {
            username: "username".to_string(),
            first_name: "firstname".to_string(),
            last_name: "lastname".to_string(),
            preferred_language: "de".to_string(),
            email: Email {
                address: "email@test.ch".to_string(),
                verified: true,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn add_user(cmds: &TestCommands, mut human: AddHuman) -> AddHuman {
        cmds.add_user_human(&inst(), &org(), &mut human, true, &PlainEncryption).unwrap();
        human
    }

    fn add_initial_user(cmds: &TestCommands) {
        let mut human = human();
        human.email.verified = false;
        add_user(cmds, human);
    }

    fn password(password: &str, old: &str) -> PasswordChange {
        PasswordChange {
            password: Some(password.to_string()),
            old_password: Some(old.to_string()),
            ..Default::default()
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // AddHuman
    // ─────────────────────────────────────────────────────────────────────

    #[test]
    fn add_requires_org_and_instance_before_any_read() {
        let (cmds, store, _bus) = commands(&["user1"]);
        let err = cmds
            .add_user_human(&inst(), &OrgId::new(""), &mut human(), true, &PlainEncryption)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let err = cmds
            .add_user_human(&InstanceId::new(" "), &org(), &mut human(), true, &PlainEncryption)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(event_types(&store).is_empty());
    }

    #[test]
    fn add_rejects_invalid_input() {
        let (cmds, _store, _bus) = with_policies(&["user1"]);

        let mut no_username = human();
        no_username.username = "  ".to_string();
        let err = cmds
            .add_user_human(&inst(), &org(), &mut no_username, true, &PlainEncryption)
            .unwrap_err();
        assert_eq!(err.message_key(), "Errors.User.Username.Empty");

        let mut bad_email = human();
        bad_email.email.address = "no-at-sign".to_string();
        let err = cmds
            .add_user_human(&inst(), &org(), &mut bad_email, true, &PlainEncryption)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let mut both = human();
        both.password = Some("password".to_string());
        both.encoded_password_hash = Some("$plain$x$password".to_string());
        let err = cmds.add_user_human(&inst(), &org(), &mut both, true, &PlainEncryption).unwrap_err();
        assert_eq!(err.message_key(), "Errors.User.Password.NotSupported");
    }

    #[test]
    fn add_existing_user_already_exists() {
        let (cmds, _store, _bus) = with_policies(&["user1"]);
        add_user(&cmds, human());

        let mut again = human();
        again.id = Some(user1());
        let err = cmds.add_user_human(&inst(), &org(), &mut again, true, &PlainEncryption).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        assert_eq!(err.message_key(), "Errors.User.AlreadyExisting");
    }

    #[test]
    fn add_without_policies_fails_precondition() {
        let (cmds, _store, _bus) = commands(&["user1"]);
        let err = cmds
            .add_user_human(&inst(), &org(), &mut human(), true, &PlainEncryption)
            .unwrap_err();
        assert_eq!(err.message_key(), "Errors.Org.DomainPolicy.NotExisting");

        cmds.set_default_domain_policy(&inst(), DomainPolicy::default()).unwrap();
        let mut with_password = human();
        with_password.password = Some("password".to_string());
        let err = cmds
            .add_user_human(&inst(), &org(), &mut with_password, true, &PlainEncryption)
            .unwrap_err();
        assert_eq!(err.message_key(), "Errors.Org.PasswordComplexityPolicy.NotFound");
    }

    #[test]
    fn add_with_init_code() {
        let (cmds, store, _bus) = with_policies(&["user1"]);
        let mut h = human();
        h.email.verified = false;
        h.password = Some("password".to_string());
        let h = add_user(&cmds, h);

        assert_eq!(h.id, Some(user1()));
        assert_eq!(h.email_code, None);
        assert_eq!(h.details.as_ref().map(|d| d.resource_owner.clone()), Some(org()));
        assert_eq!(event_types(&store), vec!["user.human.added", "user.human.initialization.code.added"]);

        let loaded = cmds.load_user(&inst(), &org(), &user1()).unwrap();
        assert_eq!(loaded.aggregate.state, UserState::Initial);
        assert_eq!(loaded.aggregate.encoded_password.as_deref(), Some("$plain$x$password"));
        assert_eq!(loaded.aggregate.profile.display_name, "firstname lastname");
    }

    #[test]
    fn add_with_returned_email_code_or_template_uses_email_code() {
        let (cmds, store, _bus) = with_policies(&["user1", "user2"]);
        let mut h = human();
        h.email = Email {
            address: "email@test.ch".to_string(),
            return_code: true,
            ..Default::default()
        };
        let h = add_user(&cmds, h);
        assert_eq!(h.email_code.as_deref(), Some("emailCode"));
        assert_eq!(event_types(&store), vec!["user.human.added", "user.human.email.code.added"]);

        let mut templated = human();
        templated.username = "other".to_string();
        templated.email = Email {
            address: "email@test.ch".to_string(),
            url_template: Some("https://example.com/verify?code={{.Code}}".to_string()),
            ..Default::default()
        };
        let templated = add_user(&cmds, templated);
        assert_eq!(templated.email_code, None);
        let types: Vec<_> = store
            .load_stream(&inst(), user::AGGREGATE_TYPE, &AggregateId::new("user2"))
            .unwrap()
            .into_iter()
            .map(|e| e.event_type)
            .collect();
        assert_eq!(types, vec!["user.human.added", "user.human.email.code.added"]);
    }

    #[test]
    fn add_without_init_mail_falls_back_to_email_code() {
        let (cmds, store, _bus) = with_policies(&["user1"]);
        let mut h = human();
        h.email.verified = false;
        cmds.add_user_human(&inst(), &org(), &mut h, false, &PlainEncryption).unwrap();
        assert_eq!(event_types(&store), vec!["user.human.added", "user.human.email.code.added"]);
    }

    #[test]
    fn add_trims_and_verifies_email() {
        let (cmds, store, _bus) = with_policies(&["user1"]);
        let mut h = human();
        h.username = " username ".to_string();
        h.email.address = " email@test.ch ".to_string();
        add_user(&cmds, h);

        assert_eq!(event_types(&store), vec!["user.human.added", "user.human.email.verified"]);
        let user = cmds.load_user(&inst(), &org(), &user1()).unwrap().aggregate;
        assert_eq!(user.username, "username");
        assert_eq!(user.email, "email@test.ch");
        assert!(user.email_verified);
    }

    #[test]
    fn add_with_phone_and_metadata() {
        let (cmds, store, _bus) = with_policies(&["user1"]);
        let mut h = human();
        h.phone = Phone {
            number: "+41 71-123 45 67".to_string(),
            return_code: true,
            ..Default::default()
        };
        h.metadata = vec![
            AddMetadataEntry {
                key: "key1".to_string(),
                value: b"value1".to_vec(),
            },
            AddMetadataEntry {
                key: "key2".to_string(),
                value: b"value2".to_vec(),
            },
        ];
        let h = add_user(&cmds, h);

        assert_eq!(h.phone_code.as_deref(), Some("phoneCode"));
        assert_eq!(
            event_types(&store),
            vec![
                "user.human.added",
                "user.human.email.verified",
                "user.human.phone.code.added",
                "user.metadata.set",
                "user.metadata.set",
            ]
        );
        let user = cmds.load_user(&inst(), &org(), &user1()).unwrap().aggregate;
        assert_eq!(user.phone.as_deref(), Some("+41711234567"));
        assert_eq!(user.metadata.get("key2").map(Vec::as_slice), Some(&b"value2"[..]));
    }

    #[test]
    fn add_with_verified_phone() {
        let (cmds, store, _bus) = with_policies(&["user1"]);
        let mut h = human();
        h.phone = Phone {
            number: "+41711234567".to_string(),
            verified: true,
            ..Default::default()
        };
        let h = add_user(&cmds, h);
        assert_eq!(h.phone_code, None);
        assert_eq!(
            event_types(&store),
            vec!["user.human.added", "user.human.email.verified", "user.human.phone.verified"]
        );
    }

    #[test]
    fn claimed_domain_username_rejected_for_other_org_accepted_for_owner() {
        let (cmds, _store, _bus) = commands(&["user1", "user2"]);
        cmds.set_default_domain_policy(&inst(), DomainPolicy::default()).unwrap();
        let owner = OrgId::new("org2");
        cmds.add_org_domain(&inst(), &owner, "test.ch").unwrap();
        cmds.verify_org_domain(&inst(), &owner, "test.ch").unwrap();

        let mut h = human();
        h.username = "username@test.ch".to_string();
        let err = cmds.add_user_human(&inst(), &org(), &mut h, true, &PlainEncryption).unwrap_err();
        assert_eq!(err.message_key(), "Errors.User.DomainNotAllowedAsUsername");

        let mut same_org = human();
        same_org.username = "username@test.ch".to_string();
        cmds.add_user_human(&inst(), &owner, &mut same_org, true, &PlainEncryption).unwrap();
        assert_eq!(same_org.id, Some(UserId::new("user2")));
    }

    #[test]
    fn removed_domain_releases_username_claim() {
        let (cmds, _store, _bus) = commands(&["user1"]);
        cmds.set_default_domain_policy(&inst(), DomainPolicy::default()).unwrap();
        let owner = OrgId::new("org2");
        cmds.add_org_domain(&inst(), &owner, "test.ch").unwrap();
        cmds.verify_org_domain(&inst(), &owner, "test.ch").unwrap();
        cmds.remove_org_domain(&inst(), &owner, "test.ch").unwrap();

        let mut h = human();
        h.username = "username@test.ch".to_string();
        cmds.add_user_human(&inst(), &org(), &mut h, true, &PlainEncryption).unwrap();
    }

    #[test]
    fn login_must_be_domain_skips_claim_check() {
        let (cmds, _store, _bus) = with_policies(&["user1"]);
        let owner = OrgId::new("org2");
        cmds.add_org_domain(&inst(), &owner, "test.ch").unwrap();
        cmds.verify_org_domain(&inst(), &owner, "test.ch").unwrap();

        let mut h = human();
        h.username = "username@test.ch".to_string();
        cmds.add_user_human(&inst(), &org(), &mut h, true, &PlainEncryption).unwrap();
    }

    // ─────────────────────────────────────────────────────────────────────
    // ChangeHuman
    // ─────────────────────────────────────────────────────────────────────

    #[test]
    fn change_requires_ids() {
        let (cmds, _store, _bus) = with_policies(&[]);
        let mut change = ChangeHuman {
            id: user1(),
            ..Default::default()
        };
        let err = cmds
            .change_user_human(&inst(), &OrgId::new(""), &mut change, &PlainEncryption)
            .unwrap_err();
        assert_eq!(err.message_key(), "Errors.ResourceOwnerMissing");

        let mut no_id = ChangeHuman::default();
        let err = cmds.change_user_human(&inst(), &org(), &mut no_id, &PlainEncryption).unwrap_err();
        assert_eq!(err.message_key(), "Errors.User.UserIDMissing");
    }

    #[test]
    fn change_unknown_or_foreign_user_is_not_found() {
        let (cmds, _store, _bus) = with_policies(&["user1"]);
        let mut change = ChangeHuman {
            id: user1(),
            username: Some("changed".to_string()),
            ..Default::default()
        };
        let err = cmds.change_user_human(&inst(), &org(), &mut change, &PlainEncryption).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        add_user(&cmds, human());
        let err = cmds
            .change_user_human(&inst(), &OrgId::new("org2"), &mut change, &PlainEncryption)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn change_with_all_fields_equal_emits_nothing() {
        let (cmds, store, _bus) = with_policies(&["user1"]);
        let added = add_user(&cmds, human());
        let before = event_types(&store).len();

        let mut change = ChangeHuman {
            id: user1(),
            username: Some(" username ".to_string()),
            profile: Some(ProfileChanges {
                first_name: Some("firstname".to_string()),
                last_name: Some("lastname".to_string()),
                preferred_language: Some("de".to_string()),
                ..Default::default()
            }),
            email: Some(Email {
                address: "email@test.ch".to_string(),
                verified: true,
                ..Default::default()
            }),
            ..Default::default()
        };
        let details = cmds.change_user_human(&inst(), &org(), &mut change, &PlainEncryption).unwrap();

        assert_eq!(event_types(&store).len(), before);
        assert_eq!(Some(details), added.details);
        assert_eq!(change.email_code, None);
    }

    #[test]
    fn change_username_checks_domain_policy() {
        let (cmds, store, _bus) = with_policies(&["user1"]);
        add_user(&cmds, human());

        let mut change = ChangeHuman {
            id: user1(),
            username: Some("changed".to_string()),
            ..Default::default()
        };
        let details = cmds.change_user_human(&inst(), &org(), &mut change, &PlainEncryption).unwrap();
        assert_eq!(event_types(&store).last().map(String::as_str), Some("user.username.changed"));
        assert_eq!(details.sequence, 3);
        assert_eq!(change.details, Some(details));
    }

    #[test]
    fn change_profile_emits_only_changed_fields() {
        let (cmds, store, _bus) = with_policies(&["user1"]);
        add_user(&cmds, human());

        let mut change = ChangeHuman {
            id: user1(),
            profile: Some(ProfileChanges {
                first_name: Some("firstname".to_string()),
                nick_name: Some("nick".to_string()),
                gender: Some(Gender::Diverse),
                ..Default::default()
            }),
            ..Default::default()
        };
        cmds.change_user_human(&inst(), &org(), &mut change, &PlainEncryption).unwrap();

        let last = store
            .load_stream(&inst(), user::AGGREGATE_TYPE, &AggregateId::new("user1"))
            .unwrap()
            .pop()
            .unwrap();
        assert_eq!(last.event_type, "user.human.profile.changed");
        let payload = &last.payload["HumanProfileChanged"];
        assert!(payload["first_name"].is_null());
        assert_eq!(payload["nick_name"], "nick");
        assert_eq!(payload["gender"], "Diverse");
    }

    #[test]
    fn change_email_issues_code_or_verifies() {
        let (cmds, store, _bus) = with_policies(&["user1"]);
        add_user(&cmds, human());

        let mut change = ChangeHuman {
            id: user1(),
            email: Some(Email {
                address: "changed@test.ch".to_string(),
                return_code: true,
                ..Default::default()
            }),
            ..Default::default()
        };
        cmds.change_user_human(&inst(), &org(), &mut change, &PlainEncryption).unwrap();
        assert_eq!(change.email_code.as_deref(), Some("emailCode"));
        let types = event_types(&store);
        assert_eq!(&types[types.len() - 2..], ["user.human.email.changed", "user.human.email.code.added"]);

        let mut verify = ChangeHuman {
            id: user1(),
            email: Some(Email {
                address: "changed@test.ch".to_string(),
                verified: true,
                ..Default::default()
            }),
            ..Default::default()
        };
        cmds.change_user_human(&inst(), &org(), &mut verify, &PlainEncryption).unwrap();
        assert_eq!(event_types(&store).last().map(String::as_str), Some("user.human.email.verified"));
        assert_eq!(verify.email_code, None);
    }

    #[test]
    fn change_phone_verified() {
        let (cmds, store, _bus) = with_policies(&["user1"]);
        add_user(&cmds, human());

        let mut change = ChangeHuman {
            id: user1(),
            phone: Some(Phone {
                number: "+41711234567".to_string(),
                verified: true,
                ..Default::default()
            }),
            ..Default::default()
        };
        cmds.change_user_human(&inst(), &org(), &mut change, &PlainEncryption).unwrap();
        let types = event_types(&store);
        assert_eq!(&types[types.len() - 2..], ["user.human.phone.changed", "user.human.phone.verified"]);
        assert_eq!(change.phone_code, None);
    }

    #[test]
    fn verifying_a_missing_phone_changes_nothing() {
        let (cmds, store, _bus) = with_policies(&["user1"]);
        add_user(&cmds, human());
        let before = event_types(&store);

        let mut change = ChangeHuman {
            id: user1(),
            phone: Some(Phone {
                number: " ".to_string(),
                verified: true,
                ..Default::default()
            }),
            ..Default::default()
        };
        let details = cmds.change_user_human(&inst(), &org(), &mut change, &PlainEncryption).unwrap();

        assert_eq!(details.sequence, before.len() as u64);
        assert_eq!(event_types(&store), before);
        let user = cmds.load_user(&inst(), &org(), &user1()).unwrap().aggregate;
        assert_eq!(user.phone, None);
        assert!(!user.phone_verified);
    }

    #[test]
    fn blank_names_are_rejected_before_reading() {
        let (cmds, store, _bus) = with_policies(&["user1"]);
        add_user(&cmds, human());
        let before = event_types(&store);

        let mut first = ChangeHuman {
            id: user1(),
            profile: Some(ProfileChanges {
                first_name: Some("  ".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let err = cmds.change_user_human(&inst(), &org(), &mut first, &PlainEncryption).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(err.message_key(), "Errors.User.Profile.FirstNameEmpty");

        let mut last = ChangeHuman {
            id: user1(),
            profile: Some(ProfileChanges {
                last_name: Some(String::new()),
                nick_name: Some("nick".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let err = cmds.change_user_human(&inst(), &org(), &mut last, &PlainEncryption).unwrap_err();
        assert_eq!(err.message_key(), "Errors.User.Profile.LastNameEmpty");

        assert_eq!(event_types(&store), before);
        let user = cmds.load_user(&inst(), &org(), &user1()).unwrap().aggregate;
        assert_eq!(user.profile.first_name, "firstname");
    }

    #[test]
    fn password_section_is_validated_before_reading() {
        let (cmds, _store, _bus) = commands(&[]);

        let mut empty = ChangeHuman {
            id: user1(),
            password: Some(PasswordChange::default()),
            ..Default::default()
        };
        let err = cmds.change_user_human(&inst(), &org(), &mut empty, &PlainEncryption).unwrap_err();
        assert_eq!(err.message_key(), "Errors.User.Password.Empty");

        let mut both = ChangeHuman {
            id: user1(),
            password: Some(PasswordChange {
                password: Some("password".to_string()),
                encoded_password_hash: Some("$plain$x$password2".to_string()),
                password_code: Some("code".to_string()),
                change_required: true,
                ..Default::default()
            }),
            ..Default::default()
        };
        let err = cmds.change_user_human(&inst(), &org(), &mut both, &PlainEncryption).unwrap_err();
        assert_eq!(err.message_key(), "Errors.User.Password.NotSupported");

        let mut unproven = ChangeHuman {
            id: user1(),
            password: Some(PasswordChange {
                password: Some("password".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let err = cmds.change_user_human(&inst(), &org(), &mut unproven, &PlainEncryption).unwrap_err();
        assert_eq!(err.message_key(), "Errors.User.Password.VerificationMissing");
    }

    #[test]
    fn password_change_on_initial_user_fails() {
        let (cmds, _store, _bus) = with_policies(&["user1"]);
        add_initial_user(&cmds);

        let mut change = ChangeHuman {
            id: user1(),
            password: Some(password("password2", "password")),
            ..Default::default()
        };
        let err = cmds.change_user_human(&inst(), &org(), &mut change, &PlainEncryption).unwrap_err();
        assert_eq!(err.message_key(), "Errors.User.NotInitialised");
    }

    #[test]
    fn password_change_checks_complexity_of_org_policy() {
        let (cmds, _store, _bus) = with_policies(&["user1"]);
        let mut h = human();
        h.password = Some("password".to_string());
        add_user(&cmds, h);
        cmds.set_org_password_complexity_policy(
            &inst(),
            &org(),
            PasswordComplexityPolicy {
                min_length: 1,
                has_lowercase: false,
                has_uppercase: true,
                has_number: false,
                has_symbol: false,
            },
        )
        .unwrap();

        let mut change = ChangeHuman {
            id: user1(),
            password: Some(password("password2", "password")),
            ..Default::default()
        };
        let err = cmds.change_user_human(&inst(), &org(), &mut change, &PlainEncryption).unwrap_err();
        assert_eq!(err.message_key(), "Errors.User.PasswordComplexityPolicy.HasUpper");
    }

    #[test]
    fn password_change_with_old_password() {
        let (cmds, store, _bus) = with_policies(&["user1"]);
        let mut h = human();
        h.password = Some("password".to_string());
        add_user(&cmds, h);

        let mut wrong = ChangeHuman {
            id: user1(),
            password: Some(password("password2", "nope")),
            ..Default::default()
        };
        let err = cmds.change_user_human(&inst(), &org(), &mut wrong, &PlainEncryption).unwrap_err();
        assert_eq!(err.message_key(), "Errors.User.Password.Invalid");

        let mut change = ChangeHuman {
            id: user1(),
            password: Some(PasswordChange {
                change_required: true,
                ..password("password2", "password")
            }),
            ..Default::default()
        };
        cmds.change_user_human(&inst(), &org(), &mut change, &PlainEncryption).unwrap();
        assert_eq!(event_types(&store).last().map(String::as_str), Some("user.human.password.changed"));
        let user = cmds.load_user(&inst(), &org(), &user1()).unwrap().aggregate;
        assert_eq!(user.encoded_password.as_deref(), Some("$plain$x$password2"));
        assert!(user.password_change_required);
    }

    #[test]
    fn password_change_with_reset_code_and_encoded_hash() {
        let (cmds, store, _bus) = with_policies(&["user1"]);
        add_user(&cmds, human());

        let mut no_code = ChangeHuman {
            id: user1(),
            password: Some(PasswordChange {
                encoded_password_hash: Some("$plain$x$password2".to_string()),
                password_code: Some("code".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let err = cmds.change_user_human(&inst(), &org(), &mut no_code, &PlainEncryption).unwrap_err();
        assert_eq!(err.message_key(), "Errors.User.Code.NotFound");

        let (_, code) = cmds
            .request_password_reset(&inst(), &org(), &user1(), true, None, &PlainEncryption)
            .unwrap();
        assert_eq!(code.as_deref(), Some("code"));

        let mut wrong = no_code.clone();
        if let Some(p) = wrong.password.as_mut() {
            p.password_code = Some("wrong".to_string());
        }
        let err = cmds.change_user_human(&inst(), &org(), &mut wrong, &PlainEncryption).unwrap_err();
        assert_eq!(err.message_key(), "Errors.User.Code.Invalid");

        cmds.change_user_human(&inst(), &org(), &mut no_code, &PlainEncryption).unwrap();
        assert_eq!(event_types(&store).last().map(String::as_str), Some("user.human.password.changed"));
        let user = cmds.load_user(&inst(), &org(), &user1()).unwrap().aggregate;
        assert_eq!(user.encoded_password.as_deref(), Some("$plain$x$password2"));
        assert!(user.password_code.is_none());
    }

    #[test]
    fn unsupported_encoded_hash_is_rejected() {
        let (cmds, _store, _bus) = with_policies(&["user1"]);
        let mut h = human();
        h.encoded_password_hash = Some("$argon2$whatever".to_string());
        let err = cmds.add_user_human(&inst(), &org(), &mut h, true, &PlainEncryption).unwrap_err();
        assert_eq!(err.message_key(), "Errors.User.Password.NotSupported");
    }

    // ─────────────────────────────────────────────────────────────────────
    // State machine
    // ─────────────────────────────────────────────────────────────────────

    #[test]
    fn lock_and_unlock() {
        let (cmds, store, _bus) = with_policies(&["user1"]);

        let err = cmds.lock_user_human(&inst(), &org(), &UserId::new("")).unwrap_err();
        assert_eq!(err.message_key(), "Errors.User.UserIDMissing");
        let err = cmds.lock_user_human(&inst(), &org(), &user1()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        add_user(&cmds, human());
        let err = cmds.unlock_user_human(&inst(), &org(), &user1()).unwrap_err();
        assert_eq!(err.message_key(), "Errors.User.NotLocked");

        let details = cmds.lock_user_human(&inst(), &org(), &user1()).unwrap();
        assert_eq!(details.sequence, 3);
        assert_eq!(event_types(&store).last().map(String::as_str), Some("user.locked"));

        let err = cmds.lock_user_human(&inst(), &org(), &user1()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PreconditionFailed);
        assert_eq!(err.message_key(), "Errors.User.ShouldBeActiveOrInitial");

        cmds.unlock_user_human(&inst(), &org(), &user1()).unwrap();
        let user = cmds.load_user(&inst(), &org(), &user1()).unwrap().aggregate;
        assert_eq!(user.state, UserState::Active);
    }

    #[test]
    fn initial_user_can_be_locked() {
        let (cmds, store, _bus) = with_policies(&["user1"]);
        add_initial_user(&cmds);
        cmds.lock_user_human(&inst(), &org(), &user1()).unwrap();
        assert_eq!(event_types(&store).last().map(String::as_str), Some("user.locked"));
    }

    #[test]
    fn deactivate_and_reactivate() {
        let (cmds, _store, _bus) = with_policies(&["user1", "user2"]);
        let err = cmds.deactivate_user_human(&inst(), &OrgId::new(""), &user1()).unwrap_err();
        assert_eq!(err.message_key(), "Errors.ResourceOwnerMissing");

        add_user(&cmds, human());
        let err = cmds.reactivate_user_human(&inst(), &org(), &user1()).unwrap_err();
        assert_eq!(err.message_key(), "Errors.User.NotInactive");

        cmds.deactivate_user_human(&inst(), &org(), &user1()).unwrap();
        let err = cmds.deactivate_user_human(&inst(), &org(), &user1()).unwrap_err();
        assert_eq!(err.message_key(), "Errors.User.AlreadyInactive");

        cmds.reactivate_user_human(&inst(), &org(), &user1()).unwrap();
        let user = cmds.load_user(&inst(), &org(), &user1()).unwrap().aggregate;
        assert_eq!(user.state, UserState::Active);

        let mut initial = human();
        initial.username = "initial".to_string();
        initial.email.verified = false;
        add_user(&cmds, initial);
        let err = cmds
            .deactivate_user_human(&inst(), &org(), &UserId::new("user2"))
            .unwrap_err();
        assert_eq!(err.message_key(), "Errors.User.CantDeactivateInitial");
    }

    #[test]
    fn init_code_activates_user() {
        let (cmds, store, _bus) = with_policies(&["user1"]);
        add_initial_user(&cmds);

        let err = cmds
            .verify_init_code(&inst(), &org(), &user1(), "wrong", &PlainEncryption)
            .unwrap_err();
        assert_eq!(err.message_key(), "Errors.User.Code.Invalid");

        cmds.verify_init_code(&inst(), &org(), &user1(), "userinit", &PlainEncryption).unwrap();
        let types = event_types(&store);
        assert_eq!(
            &types[types.len() - 2..],
            ["user.human.initialization.check.succeeded", "user.human.email.verified"]
        );

        let err = cmds
            .verify_init_code(&inst(), &org(), &user1(), "userinit", &PlainEncryption)
            .unwrap_err();
        assert_eq!(err.message_key(), "Errors.User.AlreadyInitialised");
    }

    #[test]
    fn password_reset_on_initial_user_fails() {
        let (cmds, _store, _bus) = with_policies(&["user1"]);
        add_initial_user(&cmds);
        let err = cmds
            .request_password_reset(&inst(), &org(), &user1(), false, None, &PlainEncryption)
            .unwrap_err();
        assert_eq!(err.message_key(), "Errors.User.NotInitialised");
    }

    #[test]
    fn phone_numbers_are_normalized() {
        assert_eq!(normalize_phone("+41 71-123 45 67").unwrap(), "+41711234567");
        assert!(normalize_phone("12ab5").is_err());
        assert!(normalize_phone("+123").is_err());
        assert!(validate_email("a@b.c").is_ok());
        assert!(validate_email("a@b").is_err());
        assert!(validate_email("a b@c.d").is_err());
    }
}
