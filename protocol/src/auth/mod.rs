//! # Authentication Gate
//!
//! The single decision point every protected operation passes through
//! before it touches business state. The gate runs four checks in order
//! and stops at the first failure:
//!
//! 1. identity claim and token are both present
//! 2. the identity claim satisfies the username policy
//! 3. the identity is registered
//! 4. the credential store accepts the token for that identity and address
//!
//! Step 4's sub-reason (not found, expired, identity or address mismatch)
//! is logged and kept inside [`AuthError::InvalidSession`], but callers
//! are expected to treat every variant of it the same way.

use std::net::IpAddr;
use std::sync::Arc;
use thiserror::Error;

use crate::identity::{IdentityError, Username};
use crate::retry::RetryPolicy;
use crate::session::{CredentialStore, SessionError};
use crate::storage::UserDirectory;

/// Field name of the identity claim.
pub const IDENTITY_FIELD: &str = "Username";
/// Field name of the session token.
pub const TOKEN_FIELD: &str = "Token";

/// What a caller presents to the gate. Fields are raw and unvalidated.
#[derive(Debug, Clone, Copy)]
pub struct Credentials<'a> {
    pub identity: Option<&'a str>,
    pub token: Option<&'a str>,
    /// Address the request was observed to come from.
    pub address: IpAddr,
}

impl<'a> Credentials<'a> {
    pub fn new(identity: Option<&'a str>, token: Option<&'a str>, address: IpAddr) -> Self {
        Self {
            identity,
            token,
            address,
        }
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    /// A required field was absent or empty. Carries the field name.
    #[error("missing credential: {0}")]
    MissingCredential(&'static str),

    #[error("malformed identity: {0}")]
    MalformedIdentity(#[source] IdentityError),

    #[error("unknown identity: {0}")]
    UnknownIdentity(Username),

    #[error("invalid session: {0}")]
    InvalidSession(#[source] SessionError),

    #[error("persistence unavailable: {0}")]
    PersistenceUnavailable(String),
}

impl AuthError {
    /// Short label for log fields and metric labels.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::MissingCredential(_) => "missing_credential",
            Self::MalformedIdentity(_) => "malformed_identity",
            Self::UnknownIdentity(_) => "unknown_identity",
            Self::InvalidSession(inner) => inner.reason(),
            Self::PersistenceUnavailable(_) => "persistence_unavailable",
        }
    }
}

pub type AuthResult = Result<Username, AuthError>;

/// Composes the credential store and the user directory into one
/// authorize-or-refuse decision.
pub struct AuthenticationGate<U: UserDirectory> {
    sessions: Arc<CredentialStore>,
    users: Arc<U>,
    retry: RetryPolicy,
}

impl<U: UserDirectory> AuthenticationGate<U> {
    pub fn new(sessions: Arc<CredentialStore>, users: Arc<U>, retry: RetryPolicy) -> Self {
        Self {
            sessions,
            users,
            retry,
        }
    }

    pub fn sessions(&self) -> &Arc<CredentialStore> {
        &self.sessions
    }

    /// Returns the authenticated identity, or the first check that failed.
    pub fn authenticate(&self, creds: &Credentials<'_>) -> AuthResult {
        let result = self.check(creds);
        if let Err(err) = &result {
            tracing::debug!(
                reason = err.reason(),
                identity = creds.identity.unwrap_or_default(),
                address = %creds.address,
                "authentication refused"
            );
        }
        result
    }

    fn check(&self, creds: &Credentials<'_>) -> AuthResult {
        let raw_identity = present(creds.identity).ok_or(AuthError::MissingCredential(IDENTITY_FIELD))?;
        let token = present(creds.token).ok_or(AuthError::MissingCredential(TOKEN_FIELD))?;

        let identity = Username::parse(raw_identity).map_err(AuthError::MalformedIdentity)?;

        let exists = self
            .retry
            .run("user_exists", || self.users.user_exists(&identity))
            .map_err(|e| AuthError::PersistenceUnavailable(e.to_string()))?;
        if !exists {
            return Err(AuthError::UnknownIdentity(identity));
        }

        self.sessions
            .validate(token, &identity, creds.address)
            .map_err(AuthError::InvalidSession)?;

        Ok(identity)
    }
}

fn present(field: Option<&str>) -> Option<&str> {
    field.filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::CoinDb;

    const HOME: &str = "1.2.3.4";

    struct Fixture {
        gate: AuthenticationGate<CoinDb>,
        token: String,
    }

    fn fixture() -> Fixture {
        let db = Arc::new(CoinDb::open_temporary().unwrap());
        let alice = Username::parse("alice").unwrap();
        db.insert_user(&alice, "hunter2").unwrap();

        let sessions = Arc::new(CredentialStore::default());
        let token = sessions.issue(HOME.parse().unwrap(), alice).to_string();
        Fixture {
            gate: AuthenticationGate::new(sessions, db, RetryPolicy::none()),
            token,
        }
    }

    fn creds<'a>(identity: Option<&'a str>, token: Option<&'a str>, addr: &str) -> Credentials<'a> {
        Credentials::new(identity, token, addr.parse().unwrap())
    }

    #[test]
    fn valid_credentials_are_authorized() {
        let f = fixture();
        let who = f
            .gate
            .authenticate(&creds(Some("alice"), Some(&f.token), HOME))
            .unwrap();
        assert_eq!(who.as_str(), "alice");
    }

    #[test]
    fn missing_fields_are_reported_first() {
        let f = fixture();
        assert!(matches!(
            f.gate.authenticate(&creds(None, Some(&f.token), HOME)),
            Err(AuthError::MissingCredential("Username"))
        ));
        assert!(matches!(
            f.gate.authenticate(&creds(Some("alice"), None, HOME)),
            Err(AuthError::MissingCredential("Token"))
        ));
        assert!(matches!(
            f.gate.authenticate(&creds(Some("alice"), Some(""), HOME)),
            Err(AuthError::MissingCredential("Token"))
        ));
        // Missing wins over malformed.
        assert!(matches!(
            f.gate.authenticate(&creds(Some("al ice"), None, HOME)),
            Err(AuthError::MissingCredential(_))
        ));
    }

    #[test]
    fn malformed_identity() {
        let f = fixture();
        assert!(matches!(
            f.gate.authenticate(&creds(Some("alice!"), Some(&f.token), HOME)),
            Err(AuthError::MalformedIdentity(_))
        ));
    }

    #[test]
    fn unknown_identity_does_not_touch_the_session() {
        let f = fixture();
        assert!(matches!(
            f.gate.authenticate(&creds(Some("bob"), Some(&f.token), HOME)),
            Err(AuthError::UnknownIdentity(_))
        ));
        // alice's token survived because step 4 never ran.
        assert!(f
            .gate
            .authenticate(&creds(Some("alice"), Some(&f.token), HOME))
            .is_ok());
    }

    #[test]
    fn address_mismatch_evicts_session() {
        let f = fixture();
        assert!(matches!(
            f.gate.authenticate(&creds(Some("alice"), Some(&f.token), "5.6.7.8")),
            Err(AuthError::InvalidSession(SessionError::AddressMismatch))
        ));
        assert!(matches!(
            f.gate.authenticate(&creds(Some("alice"), Some(&f.token), HOME)),
            Err(AuthError::InvalidSession(SessionError::TokenNotFound))
        ));
    }

    #[test]
    fn identity_mismatch_evicts_session() {
        let f = fixture();
        let db_user = Username::parse("mallory").unwrap();
        f.gate.users.insert_user(&db_user, "pw").unwrap();

        assert!(matches!(
            f.gate.authenticate(&creds(Some("mallory"), Some(&f.token), HOME)),
            Err(AuthError::InvalidSession(SessionError::IdentityMismatch))
        ));
        assert!(f.gate.sessions().is_empty());
    }

    #[test]
    fn unknown_token() {
        let f = fixture();
        assert!(matches!(
            f.gate.authenticate(&creds(Some("alice"), Some("not-a-token"), HOME)),
            Err(AuthError::InvalidSession(SessionError::TokenNotFound))
        ));
        assert_eq!(f.gate.sessions().len(), 1);
    }

    #[test]
    fn storage_fault_refuses_without_burning_the_session() {
        use crate::storage::faulty::{fast_retry, FlakyDirectory};

        let users = Arc::new(FlakyDirectory::new());
        let alice = Username::parse("alice").unwrap();
        users.inner().insert_user(&alice, "hunter2").unwrap();
        let sessions = Arc::new(CredentialStore::default());
        let token = sessions.issue(HOME.parse().unwrap(), alice).to_string();
        let gate = AuthenticationGate::new(Arc::clone(&sessions), Arc::clone(&users), fast_retry());

        users.fail_users(true);
        assert!(matches!(
            gate.authenticate(&creds(Some("alice"), Some(&token), HOME)),
            Err(AuthError::PersistenceUnavailable(_))
        ));
        assert_eq!(users.failed_calls(), 3);
        assert_eq!(sessions.len(), 1);

        users.fail_users(false);
        assert!(gate
            .authenticate(&creds(Some("alice"), Some(&token), HOME))
            .is_ok());
    }
}
