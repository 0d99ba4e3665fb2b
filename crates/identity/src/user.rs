//! Human user aggregate (event-sourced).
//!
//! The aggregate only sees fully resolved commands: passwords are already
//! hashed, codes already generated and encrypted, policies already checked.
//! What remains here is existence, diffing against current state and the
//! lifecycle state machine.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use portcullis_core::{Aggregate, AggregateRoot, DomainError, DomainResult, OrgId, UserId};
use portcullis_events::Event;

use crate::crypto::{CryptoValue, GeneratedCode};

pub const AGGREGATE_TYPE: &str = "user";

// ─────────────────────────────────────────────────────────────────────────────
// User State
// ─────────────────────────────────────────────────────────────────────────────

/// Lifecycle state of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum UserState {
    /// No `HumanAdded` in the stream yet.
    #[default]
    Unspecified,
    /// Waiting for the initialization code to be confirmed.
    Initial,
    Active,
    Inactive,
    Locked,
}

impl core::fmt::Display for UserState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            UserState::Unspecified => write!(f, "Unspecified"),
            UserState::Initial => write!(f, "Initial"),
            UserState::Active => write!(f, "Active"),
            UserState::Inactive => write!(f, "Inactive"),
            UserState::Locked => write!(f, "Locked"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Gender {
    #[default]
    Unspecified,
    Female,
    Male,
    Diverse,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Profile {
    pub first_name: String,
    pub last_name: String,
    pub nick_name: String,
    pub display_name: String,
    pub preferred_language: String,
    pub gender: Gender,
}

/// An encrypted one-time code stored on the user, valid for `expiry_secs`
/// after `created_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCode {
    pub code: CryptoValue,
    pub created_at: DateTime<Utc>,
    pub expiry_secs: u64,
}

// ─────────────────────────────────────────────────────────────────────────────
// Human User Aggregate
// ─────────────────────────────────────────────────────────────────────────────

/// Human user aggregate.
///
/// # Invariants
/// - A user is added exactly once and belongs to exactly one org (its resource owner).
/// - Only Active or Initial users can be locked; only Locked users unlocked.
/// - Initial users cannot be deactivated and cannot change their password.
#[derive(Debug, Clone, Default)]
pub struct HumanUser {
    pub id: UserId,
    pub resource_owner: OrgId,
    pub state: UserState,
    pub username: String,
    pub profile: Profile,
    pub email: String,
    pub email_verified: bool,
    pub phone: Option<String>,
    pub phone_verified: bool,
    pub encoded_password: Option<String>,
    pub password_change_required: bool,
    pub init_code: Option<PendingCode>,
    pub password_code: Option<PendingCode>,
    pub metadata: BTreeMap<String, Vec<u8>>,
    pub version: u64,
    pub last_changed: Option<DateTime<Utc>>,
}

impl HumanUser {
    pub fn empty(id: UserId, resource_owner: OrgId) -> Self {
        Self {
            id,
            resource_owner,
            ..Default::default()
        }
    }

    pub fn exists(&self) -> bool {
        self.state != UserState::Unspecified
    }

    fn ensure_exists(&self) -> DomainResult<()> {
        if !self.exists() {
            return Err(DomainError::not_found("COMMAND-k2unb", "Errors.User.NotFound"));
        }
        Ok(())
    }

    /// Password changes and reset requests need an initialised user.
    pub fn ensure_password_changeable(&self) -> DomainResult<()> {
        self.ensure_exists()?;
        if self.state == UserState::Initial {
            return Err(DomainError::precondition("COMMAND-M9dse", "Errors.User.NotInitialised"));
        }
        Ok(())
    }

    pub fn username_differs(&self, username: &str) -> bool {
        self.username != username.trim()
    }

    /// How a requested email (address + verified flag) relates to the current one.
    pub fn email_update(&self, address: &str, verified: bool) -> ContactUpdate {
        ContactUpdate::diff(&self.email, self.email_verified, address, verified)
    }

    pub fn phone_update(&self, number: &str, verified: bool) -> ContactUpdate {
        ContactUpdate::diff(
            self.phone.as_deref().unwrap_or_default(),
            self.phone_verified,
            number,
            verified,
        )
    }
}

impl AggregateRoot for HumanUser {
    type Id = UserId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Outcome of diffing a requested email/phone against the stored one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactUpdate {
    Unchanged,
    /// A different, non-empty value: change it and verify or send a code.
    Changed { verified: bool },
    /// Same (or no) value, but the caller marks the existing one verified.
    VerifyOnly,
}

impl ContactUpdate {
    fn diff(current: &str, current_verified: bool, requested: &str, verified: bool) -> Self {
        let requested = requested.trim();
        if !requested.is_empty() && requested != current {
            ContactUpdate::Changed { verified }
        } else if verified && !current_verified && !current.is_empty() {
            ContactUpdate::VerifyOnly
        } else {
            ContactUpdate::Unchanged
        }
    }

    /// True when applying this update requires a fresh verification code.
    pub fn needs_code(self) -> bool {
        matches!(self, ContactUpdate::Changed { verified: false })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

/// A generated code ready to be stored on the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedCode {
    pub code: CryptoValue,
    pub expiry_secs: u64,
    pub url_template: Option<String>,
    pub code_returned: bool,
}

impl IssuedCode {
    pub fn new(generated: &GeneratedCode, url_template: Option<String>, code_returned: bool) -> Self {
        Self {
            code: generated.crypted.clone(),
            expiry_secs: generated.expiry.as_secs(),
            url_template,
            code_returned,
        }
    }
}

/// Which verification path a newly added email takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailSetupKind {
    Verified,
    Code,
    InitCode,
}

impl EmailSetupKind {
    /// A verified email needs nothing. An explicit return code or URL template
    /// asks for an email code, otherwise the init mail path is used when allowed.
    pub fn for_new_human(verified: bool, return_code: bool, has_url_template: bool, allow_init_mail: bool) -> Self {
        if verified {
            EmailSetupKind::Verified
        } else if return_code || has_url_template || !allow_init_mail {
            EmailSetupKind::Code
        } else {
            EmailSetupKind::InitCode
        }
    }
}

#[derive(Debug, Clone)]
pub enum EmailSetup {
    Verified,
    Code(IssuedCode),
    InitCode(IssuedCode),
}

#[derive(Debug, Clone)]
pub enum PhoneSetup {
    Verified,
    Code(IssuedCode),
}

#[derive(Debug, Clone)]
pub struct NewPhone {
    pub number: String,
    pub setup: PhoneSetup,
}

/// Add a human user (inputs normalised, password hashed, codes issued).
#[derive(Debug, Clone)]
pub struct NewHuman {
    pub username: String,
    pub profile: Profile,
    pub email: String,
    pub email_setup: EmailSetup,
    pub phone: Option<NewPhone>,
    pub encoded_password: Option<String>,
    pub password_change_required: bool,
    pub metadata: Vec<(String, Vec<u8>)>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileChanges {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub nick_name: Option<String>,
    pub display_name: Option<String>,
    pub preferred_language: Option<String>,
    pub gender: Option<Gender>,
}

#[derive(Debug, Clone)]
pub struct ContactChange {
    pub value: String,
    pub verified: bool,
    /// Required when the value changes without being verified.
    pub code: Option<IssuedCode>,
}

/// New, already verified and hashed password.
#[derive(Debug, Clone)]
pub struct NewPassword {
    pub encoded_password: String,
    pub change_required: bool,
}

#[derive(Debug, Clone)]
pub struct HumanChanges {
    pub username: Option<String>,
    pub profile: Option<ProfileChanges>,
    pub email: Option<ContactChange>,
    pub phone: Option<ContactChange>,
    pub password: Option<NewPassword>,
    pub occurred_at: DateTime<Utc>,
}

/// All human user commands.
#[derive(Debug, Clone)]
pub enum UserCommand {
    AddHuman(Box<NewHuman>),
    ChangeHuman(Box<HumanChanges>),
    RequestPasswordReset { code: IssuedCode, occurred_at: DateTime<Utc> },
    /// The init code was checked by the caller.
    CompleteInitialization { occurred_at: DateTime<Utc> },
    Lock { occurred_at: DateTime<Utc> },
    Unlock { occurred_at: DateTime<Utc> },
    Deactivate { occurred_at: DateTime<Utc> },
    Reactivate { occurred_at: DateTime<Utc> },
}

// ─────────────────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HumanAdded {
    pub username: String,
    pub profile: Profile,
    pub email: String,
    pub phone: Option<String>,
    pub encoded_password: Option<String>,
    pub password_change_required: bool,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeAdded {
    pub code: CryptoValue,
    pub expiry_secs: u64,
    pub url_template: Option<String>,
    pub code_returned: bool,
    pub occurred_at: DateTime<Utc>,
}

impl CodeAdded {
    fn new(issued: &IssuedCode, occurred_at: DateTime<Utc>) -> Self {
        Self {
            code: issued.code.clone(),
            expiry_secs: issued.expiry_secs,
            url_template: issued.url_template.clone(),
            code_returned: issued.code_returned,
            occurred_at,
        }
    }

    fn pending(&self) -> PendingCode {
        PendingCode {
            code: self.code.clone(),
            created_at: self.occurred_at,
            expiry_secs: self.expiry_secs,
        }
    }
}

/// Payload of events that carry nothing but their time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occurred {
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataSet {
    pub key: String,
    pub value: Vec<u8>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsernameChanged {
    pub username: String,
    pub occurred_at: DateTime<Utc>,
}

/// Only the fields that changed are set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileChanged {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub nick_name: Option<String>,
    pub display_name: Option<String>,
    pub preferred_language: Option<String>,
    pub gender: Option<Gender>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactChanged {
    pub value: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordChanged {
    pub encoded_password: String,
    pub change_required: bool,
    pub occurred_at: DateTime<Utc>,
}

/// All human user events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserEvent {
    HumanAdded(HumanAdded),
    HumanEmailVerified(Occurred),
    HumanEmailCodeAdded(CodeAdded),
    HumanInitialCodeAdded(CodeAdded),
    HumanInitializedCheckSucceeded(Occurred),
    HumanPhoneVerified(Occurred),
    HumanPhoneCodeAdded(CodeAdded),
    UserMetadataSet(MetadataSet),
    UsernameChanged(UsernameChanged),
    HumanProfileChanged(ProfileChanged),
    HumanEmailChanged(ContactChanged),
    HumanPhoneChanged(ContactChanged),
    HumanPasswordCodeAdded(CodeAdded),
    HumanPasswordChanged(PasswordChanged),
    UserLocked(Occurred),
    UserUnlocked(Occurred),
    UserDeactivated(Occurred),
    UserReactivated(Occurred),
}

impl Event for UserEvent {
    fn event_type(&self) -> &'static str {
        match self {
            UserEvent::HumanAdded(_) => "user.human.added",
            UserEvent::HumanEmailVerified(_) => "user.human.email.verified",
            UserEvent::HumanEmailCodeAdded(_) => "user.human.email.code.added",
            UserEvent::HumanInitialCodeAdded(_) => "user.human.initialization.code.added",
            UserEvent::HumanInitializedCheckSucceeded(_) => "user.human.initialization.check.succeeded",
            UserEvent::HumanPhoneVerified(_) => "user.human.phone.verified",
            UserEvent::HumanPhoneCodeAdded(_) => "user.human.phone.code.added",
            UserEvent::UserMetadataSet(_) => "user.metadata.set",
            UserEvent::UsernameChanged(_) => "user.username.changed",
            UserEvent::HumanProfileChanged(_) => "user.human.profile.changed",
            UserEvent::HumanEmailChanged(_) => "user.human.email.changed",
            UserEvent::HumanPhoneChanged(_) => "user.human.phone.changed",
            UserEvent::HumanPasswordCodeAdded(_) => "user.human.password.code.added",
            UserEvent::HumanPasswordChanged(_) => "user.human.password.changed",
            UserEvent::UserLocked(_) => "user.locked",
            UserEvent::UserUnlocked(_) => "user.unlocked",
            UserEvent::UserDeactivated(_) => "user.deactivated",
            UserEvent::UserReactivated(_) => "user.reactivated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            UserEvent::HumanAdded(e) => e.occurred_at,
            UserEvent::HumanEmailCodeAdded(e)
            | UserEvent::HumanInitialCodeAdded(e)
            | UserEvent::HumanPhoneCodeAdded(e)
            | UserEvent::HumanPasswordCodeAdded(e) => e.occurred_at,
            UserEvent::HumanEmailVerified(e)
            | UserEvent::HumanInitializedCheckSucceeded(e)
            | UserEvent::HumanPhoneVerified(e)
            | UserEvent::UserLocked(e)
            | UserEvent::UserUnlocked(e)
            | UserEvent::UserDeactivated(e)
            | UserEvent::UserReactivated(e) => e.occurred_at,
            UserEvent::UserMetadataSet(e) => e.occurred_at,
            UserEvent::UsernameChanged(e) => e.occurred_at,
            UserEvent::HumanProfileChanged(e) => e.occurred_at,
            UserEvent::HumanEmailChanged(e) | UserEvent::HumanPhoneChanged(e) => e.occurred_at,
            UserEvent::HumanPasswordChanged(e) => e.occurred_at,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Aggregate Implementation
// ─────────────────────────────────────────────────────────────────────────────

impl Aggregate for HumanUser {
    type Command = UserCommand;
    type Event = UserEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            UserEvent::HumanAdded(e) => self.apply_added(e),
            UserEvent::HumanEmailVerified(_) => self.email_verified = true,
            UserEvent::HumanEmailCodeAdded(_) | UserEvent::HumanPhoneCodeAdded(_) => {}
            UserEvent::HumanInitialCodeAdded(e) => {
                self.state = UserState::Initial;
                self.init_code = Some(e.pending());
            }
            UserEvent::HumanInitializedCheckSucceeded(_) => {
                self.state = UserState::Active;
                self.init_code = None;
            }
            UserEvent::HumanPhoneVerified(_) => self.phone_verified = true,
            UserEvent::UserMetadataSet(e) => {
                self.metadata.insert(e.key.clone(), e.value.clone());
            }
            UserEvent::UsernameChanged(e) => self.username = e.username.clone(),
            UserEvent::HumanProfileChanged(e) => self.apply_profile_changed(e),
            UserEvent::HumanEmailChanged(e) => {
                self.email = e.value.clone();
                self.email_verified = false;
            }
            UserEvent::HumanPhoneChanged(e) => {
                self.phone = Some(e.value.clone());
                self.phone_verified = false;
            }
            UserEvent::HumanPasswordCodeAdded(e) => self.password_code = Some(e.pending()),
            UserEvent::HumanPasswordChanged(e) => {
                self.encoded_password = Some(e.encoded_password.clone());
                self.password_change_required = e.change_required;
                self.password_code = None;
            }
            UserEvent::UserLocked(_) => self.state = UserState::Locked,
            UserEvent::UserUnlocked(_) | UserEvent::UserReactivated(_) => self.state = UserState::Active,
            UserEvent::UserDeactivated(_) => self.state = UserState::Inactive,
        }
        self.last_changed = Some(event.occurred_at());
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            UserCommand::AddHuman(cmd) => self.handle_add(cmd),
            UserCommand::ChangeHuman(cmd) => self.handle_change(cmd),
            UserCommand::RequestPasswordReset { code, occurred_at } => {
                self.ensure_password_changeable()?;
                Ok(vec![UserEvent::HumanPasswordCodeAdded(CodeAdded::new(code, *occurred_at))])
            }
            UserCommand::CompleteInitialization { occurred_at } => {
                self.ensure_exists()?;
                if self.state != UserState::Initial {
                    return Err(DomainError::precondition("COMMAND-gS32h", "Errors.User.AlreadyInitialised"));
                }
                let stamp = Occurred { occurred_at: *occurred_at };
                let mut events = vec![UserEvent::HumanInitializedCheckSucceeded(stamp.clone())];
                if !self.email_verified {
                    events.push(UserEvent::HumanEmailVerified(stamp));
                }
                Ok(events)
            }
            UserCommand::Lock { occurred_at } => {
                self.ensure_exists()?;
                if !matches!(self.state, UserState::Active | UserState::Initial) {
                    return Err(DomainError::precondition(
                        "COMMAND-3NN8v",
                        "Errors.User.ShouldBeActiveOrInitial",
                    ));
                }
                Ok(vec![UserEvent::UserLocked(Occurred { occurred_at: *occurred_at })])
            }
            UserCommand::Unlock { occurred_at } => {
                self.ensure_exists()?;
                if self.state != UserState::Locked {
                    return Err(DomainError::precondition("COMMAND-4M0ds", "Errors.User.NotLocked"));
                }
                Ok(vec![UserEvent::UserUnlocked(Occurred { occurred_at: *occurred_at })])
            }
            UserCommand::Deactivate { occurred_at } => {
                self.ensure_exists()?;
                match self.state {
                    UserState::Initial => Err(DomainError::precondition(
                        "COMMAND-ke0fw",
                        "Errors.User.CantDeactivateInitial",
                    )),
                    UserState::Inactive => {
                        Err(DomainError::precondition("COMMAND-5M0sf", "Errors.User.AlreadyInactive"))
                    }
                    _ => Ok(vec![UserEvent::UserDeactivated(Occurred { occurred_at: *occurred_at })]),
                }
            }
            UserCommand::Reactivate { occurred_at } => {
                self.ensure_exists()?;
                if self.state != UserState::Inactive {
                    return Err(DomainError::precondition("COMMAND-6M0sf", "Errors.User.NotInactive"));
                }
                Ok(vec![UserEvent::UserReactivated(Occurred { occurred_at: *occurred_at })])
            }
        }
    }
}

impl HumanUser {
    // ─────────────────────────────────────────────────────────────────────────
    // Command Handlers
    // ─────────────────────────────────────────────────────────────────────────

    fn handle_add(&self, cmd: &NewHuman) -> Result<Vec<UserEvent>, DomainError> {
        if self.exists() {
            return Err(DomainError::already_exists("COMMAND-k2unb", "Errors.User.AlreadyExisting"));
        }

        let at = cmd.occurred_at;
        let mut events = vec![UserEvent::HumanAdded(HumanAdded {
            username: cmd.username.clone(),
            profile: cmd.profile.clone(),
            email: cmd.email.clone(),
            phone: cmd.phone.as_ref().map(|p| p.number.clone()),
            encoded_password: cmd.encoded_password.clone(),
            password_change_required: cmd.password_change_required,
            occurred_at: at,
        })];

        events.push(match &cmd.email_setup {
            EmailSetup::Verified => UserEvent::HumanEmailVerified(Occurred { occurred_at: at }),
            EmailSetup::Code(code) => UserEvent::HumanEmailCodeAdded(CodeAdded::new(code, at)),
            EmailSetup::InitCode(code) => UserEvent::HumanInitialCodeAdded(CodeAdded::new(code, at)),
        });

        if let Some(phone) = &cmd.phone {
            events.push(match &phone.setup {
                PhoneSetup::Verified => UserEvent::HumanPhoneVerified(Occurred { occurred_at: at }),
                PhoneSetup::Code(code) => UserEvent::HumanPhoneCodeAdded(CodeAdded::new(code, at)),
            });
        }

        events.extend(cmd.metadata.iter().map(|(key, value)| {
            UserEvent::UserMetadataSet(MetadataSet {
                key: key.clone(),
                value: value.clone(),
                occurred_at: at,
            })
        }));

        Ok(events)
    }

    fn handle_change(&self, cmd: &HumanChanges) -> Result<Vec<UserEvent>, DomainError> {
        self.ensure_exists()?;
        let at = cmd.occurred_at;
        let mut events = Vec::new();

        if let Some(username) = &cmd.username {
            if self.username_differs(username) {
                events.push(UserEvent::UsernameChanged(UsernameChanged {
                    username: username.trim().to_string(),
                    occurred_at: at,
                }));
            }
        }

        if let Some(changes) = &cmd.profile {
            if let Some(changed) = self.profile_diff(changes, at) {
                events.push(UserEvent::HumanProfileChanged(changed));
            }
        }

        if let Some(email) = &cmd.email {
            let update = self.email_update(&email.value, email.verified);
            events.extend(contact_events(
                update,
                email,
                at,
                UserEvent::HumanEmailChanged,
                UserEvent::HumanEmailVerified,
                UserEvent::HumanEmailCodeAdded,
            )?);
        }

        if let Some(phone) = &cmd.phone {
            let update = self.phone_update(&phone.value, phone.verified);
            events.extend(contact_events(
                update,
                phone,
                at,
                UserEvent::HumanPhoneChanged,
                UserEvent::HumanPhoneVerified,
                UserEvent::HumanPhoneCodeAdded,
            )?);
        }

        if let Some(password) = &cmd.password {
            self.ensure_password_changeable()?;
            events.push(UserEvent::HumanPasswordChanged(PasswordChanged {
                encoded_password: password.encoded_password.clone(),
                change_required: password.change_required,
                occurred_at: at,
            }));
        }

        Ok(events)
    }

    fn profile_diff(&self, changes: &ProfileChanges, at: DateTime<Utc>) -> Option<ProfileChanged> {
        fn changed(current: &str, requested: &Option<String>) -> Option<String> {
            requested
                .as_deref()
                .map(str::trim)
                .filter(|v| *v != current)
                .map(str::to_string)
        }

        let p = &self.profile;
        let diff = ProfileChanged {
            first_name: changed(&p.first_name, &changes.first_name),
            last_name: changed(&p.last_name, &changes.last_name),
            nick_name: changed(&p.nick_name, &changes.nick_name),
            display_name: changed(&p.display_name, &changes.display_name),
            preferred_language: changed(&p.preferred_language, &changes.preferred_language),
            gender: changes.gender.filter(|g| *g != p.gender),
            occurred_at: at,
        };

        let any = diff.first_name.is_some()
            || diff.last_name.is_some()
            || diff.nick_name.is_some()
            || diff.display_name.is_some()
            || diff.preferred_language.is_some()
            || diff.gender.is_some();
        any.then_some(diff)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Event Appliers
    // ─────────────────────────────────────────────────────────────────────────

    fn apply_added(&mut self, e: &HumanAdded) {
        self.state = UserState::Active;
        self.username = e.username.clone();
        self.profile = e.profile.clone();
        self.email = e.email.clone();
        self.phone = e.phone.clone();
        self.encoded_password = e.encoded_password.clone();
        self.password_change_required = e.password_change_required;
    }

    fn apply_profile_changed(&mut self, e: &ProfileChanged) {
        let p = &mut self.profile;
        if let Some(v) = &e.first_name {
            p.first_name = v.clone();
        }
        if let Some(v) = &e.last_name {
            p.last_name = v.clone();
        }
        if let Some(v) = &e.nick_name {
            p.nick_name = v.clone();
        }
        if let Some(v) = &e.display_name {
            p.display_name = v.clone();
        }
        if let Some(v) = &e.preferred_language {
            p.preferred_language = v.clone();
        }
        if let Some(v) = e.gender {
            p.gender = v;
        }
    }
}

fn contact_events(
    update: ContactUpdate,
    change: &ContactChange,
    at: DateTime<Utc>,
    changed: fn(ContactChanged) -> UserEvent,
    verified: fn(Occurred) -> UserEvent,
    code_added: fn(CodeAdded) -> UserEvent,
) -> DomainResult<Vec<UserEvent>> {
    Ok(match update {
        ContactUpdate::Unchanged => Vec::new(),
        ContactUpdate::VerifyOnly => vec![verified(Occurred { occurred_at: at })],
        ContactUpdate::Changed { verified: is_verified } => {
            let mut events = vec![changed(ContactChanged {
                value: change.value.trim().to_string(),
                occurred_at: at,
            })];
            if is_verified {
                events.push(verified(Occurred { occurred_at: at }));
            } else {
                let code = change.code.as_ref().ok_or_else(|| {
                    DomainError::internal(
                        "COMMAND-Cd0de",
                        "Errors.Internal",
                        "contact change requires a verification code",
                    )
                })?;
                events.push(code_added(CodeAdded::new(code, at)));
            }
            events
        }
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
