//! # Service Error Taxonomy
//!
//! Every failure a client can observe, folded from the per-module error
//! types into one stable classification. Each variant has a fixed
//! [`code`](ServiceError::code) that transports can map to their own
//! status scheme.
//!
//! `InvalidSession` (you are not authenticated) and `NotAuthorizedHolder`
//! (you are, but you may not do this) are kept strictly apart.

use thiserror::Error;

use crate::auth::AuthError;
use crate::group::GroupError;
use crate::identity::IdentityError;
use crate::session::SessionError;
use crate::storage::DirectoryError;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("missing credential: {0}")]
    MissingCredential(&'static str),

    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("malformed identity: {0}")]
    MalformedIdentity(IdentityError),

    #[error("malformed secret: {0}")]
    MalformedSecret(IdentityError),

    #[error("unknown identity: {0}")]
    UnknownIdentity(String),

    #[error("identity already registered: {0}")]
    IdentityTaken(String),

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("invalid session")]
    InvalidSession(SessionError),

    /// Carries the full description of what was looked up.
    #[error("{0}")]
    GroupNotFound(String),

    #[error("already a member of group {0}")]
    AlreadyMember(String),

    #[error("not the coin holder of group {0}")]
    NotAuthorizedHolder(String),

    #[error("coin of group {0} was passed concurrently")]
    StaleHolder(String),

    #[error("persistence unavailable")]
    PersistenceUnavailable(String),
}

impl ServiceError {
    /// Stable machine-readable classification.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingCredential(_) => "missing_credential",
            Self::MissingField(_) => "missing_field",
            Self::MalformedIdentity(_) => "malformed_identity",
            Self::MalformedSecret(_) => "malformed_secret",
            Self::UnknownIdentity(_) => "unknown_identity",
            Self::IdentityTaken(_) => "identity_taken",
            Self::InvalidCredentials => "invalid_credentials",
            Self::InvalidSession(_) => "invalid_session",
            Self::GroupNotFound(_) => "group_not_found",
            Self::AlreadyMember(_) => "already_member",
            Self::NotAuthorizedHolder(_) => "not_authorized_holder",
            Self::StaleHolder(_) => "stale_holder",
            Self::PersistenceUnavailable(_) => "persistence_unavailable",
        }
    }

    /// `true` when the request was refused before any business logic ran:
    /// the caller is not (or could not be shown to be) who they claim.
    pub fn is_authentication_failure(&self) -> bool {
        matches!(
            self,
            Self::MissingCredential(_)
                | Self::MalformedIdentity(_)
                | Self::MalformedSecret(_)
                | Self::UnknownIdentity(_)
                | Self::InvalidCredentials
                | Self::InvalidSession(_)
        )
    }

    /// Policy violations on either the username or the secret.
    pub fn from_policy(err: IdentityError) -> Self {
        if err.concerns_secret() {
            Self::MalformedSecret(err)
        } else {
            Self::MalformedIdentity(err)
        }
    }
}

impl From<AuthError> for ServiceError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingCredential(field) => Self::MissingCredential(field),
            AuthError::MalformedIdentity(e) => Self::MalformedIdentity(e),
            AuthError::UnknownIdentity(who) => Self::UnknownIdentity(who.to_string()),
            AuthError::InvalidSession(e) => Self::InvalidSession(e),
            AuthError::PersistenceUnavailable(e) => Self::PersistenceUnavailable(e),
        }
    }
}

impl From<GroupError> for ServiceError {
    fn from(err: GroupError) -> Self {
        match err {
            GroupError::GroupNotFound(_) | GroupError::NoGroupFor(_) => {
                Self::GroupNotFound(err.to_string())
            }
            GroupError::AlreadyMember { group, .. } => Self::AlreadyMember(group.to_string()),
            GroupError::NotAuthorizedHolder { group, .. } => {
                Self::NotAuthorizedHolder(group.to_string())
            }
            GroupError::StaleHolder(id) => Self::StaleHolder(id.to_string()),
            GroupError::PersistenceUnavailable(e) => Self::PersistenceUnavailable(e),
        }
    }
}

impl From<DirectoryError> for ServiceError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::UserExists(who) => Self::IdentityTaken(who.to_string()),
            other => GroupError::from(other).into(),
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
