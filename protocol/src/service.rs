//! # Coin Service
//!
//! The facade a transport calls into. Each method takes the raw fields a
//! request carried, runs the authentication gate where the operation is
//! protected, then hands off to membership or custody. Every failure comes
//! back as a [`ServiceError`].
//!
//! All methods are synchronous and may block on storage or password
//! hashing; async callers should run them on a blocking thread.

use std::net::IpAddr;
use std::sync::Arc;

use crate::auth::{AuthenticationGate, Credentials};
use crate::error::{ServiceError, ServiceResult};
use crate::group::{CoinCustody, CoinTransfer, Group, GroupId, Membership, ReselectionPolicy};
use crate::identity::{check_secret, Username};
use crate::retry::RetryPolicy;
use crate::session::{CredentialStore, SessionConfig, SessionToken};
use crate::storage::{GroupDirectory, UserDirectory};

/// Field name of the password on register and login.
pub const SECRET_FIELD: &str = "Password";
/// Field name of the group identifier on join and coin transfer.
pub const GROUP_FIELD: &str = "ID";

#[derive(Debug, Clone, Copy, Default)]
pub struct ServiceConfig {
    pub session: SessionConfig,
    pub reselection: ReselectionPolicy,
    pub retry: RetryPolicy,
}

pub struct CoinService<D: UserDirectory + GroupDirectory> {
    directory: Arc<D>,
    sessions: Arc<CredentialStore>,
    gate: AuthenticationGate<D>,
    membership: Membership<D>,
    custody: CoinCustody<D>,
    retry: RetryPolicy,
}

impl<D: UserDirectory + GroupDirectory> CoinService<D> {
    pub fn new(directory: Arc<D>, config: ServiceConfig) -> Self {
        let sessions = Arc::new(CredentialStore::new(config.session));
        Self {
            gate: AuthenticationGate::new(Arc::clone(&sessions), Arc::clone(&directory), config.retry),
            membership: Membership::new(Arc::clone(&directory), config.retry),
            custody: CoinCustody::new(Arc::clone(&directory), config.reselection, config.retry),
            directory,
            sessions,
            retry: config.retry,
        }
    }

    /// The credential store, shared with the session reaper.
    pub fn sessions(&self) -> &Arc<CredentialStore> {
        &self.sessions
    }

    pub fn directory(&self) -> &Arc<D> {
        &self.directory
    }

    // -----------------------------------------------------------------------
    // Clients
    // -----------------------------------------------------------------------

    pub fn register(
        &self,
        username: Option<&str>,
        secret: Option<&str>,
    ) -> ServiceResult<Username> {
        let (username, secret) = parse_login_fields(username, secret)?;

        // insert_user is itself insert-if-absent; UserExists maps to IdentityTaken.
        self.retry
            .run("insert_user", || self.directory.insert_user(&username, secret))?;
        Ok(username)
    }

    pub fn login(
        &self,
        username: Option<&str>,
        secret: Option<&str>,
        address: IpAddr,
    ) -> ServiceResult<SessionToken> {
        let (username, secret) = parse_login_fields(username, secret)?;

        let exists = self
            .retry
            .run("user_exists", || self.directory.user_exists(&username))?;
        if !exists {
            return Err(ServiceError::UnknownIdentity(username.to_string()));
        }

        let matches = self.retry.run("credentials_match", || {
            self.directory.credentials_match(&username, secret)
        })?;
        if !matches {
            tracing::info!(identity = %username, %address, "login refused: wrong password");
            return Err(ServiceError::InvalidCredentials);
        }

        Ok(self.sessions.issue(address, username))
    }

    /// Revokes the caller's own session.
    pub fn logout(&self, creds: &Credentials<'_>) -> ServiceResult<()> {
        self.gate.authenticate(creds)?;
        if let Some(token) = creds.token {
            self.sessions.revoke(token);
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Groups
    // -----------------------------------------------------------------------

    pub fn create_group(&self, creds: &Credentials<'_>) -> ServiceResult<Group> {
        let caller = self.gate.authenticate(creds)?;
        Ok(self.membership.create(&caller)?)
    }

    /// The first group `user` belongs to.
    pub fn group_of(&self, creds: &Credentials<'_>, user: &str) -> ServiceResult<Group> {
        self.gate.authenticate(creds)?;
        let user = Username::parse(user).map_err(ServiceError::MalformedIdentity)?;
        Ok(self.membership.group_of(&user)?)
    }

    pub fn join(&self, creds: &Credentials<'_>, group_id: Option<&str>) -> ServiceResult<Group> {
        let caller = self.gate.authenticate(creds)?;
        let group_id = group_field(group_id)?;
        Ok(self.membership.join(&caller, &group_id)?)
    }

    pub fn pass_coin(
        &self,
        creds: &Credentials<'_>,
        group_id: Option<&str>,
    ) -> ServiceResult<CoinTransfer> {
        let caller = self.gate.authenticate(creds)?;
        let group_id = group_field(group_id)?;
        Ok(self.custody.pass_coin(&caller, &group_id)?)
    }
}

fn parse_login_fields<'a>(
    username: Option<&str>,
    secret: Option<&'a str>,
) -> ServiceResult<(Username, &'a str)> {
    let username = username
        .filter(|v| !v.is_empty())
        .ok_or(ServiceError::MissingCredential(crate::auth::IDENTITY_FIELD))?;
    let secret = secret
        .filter(|v| !v.is_empty())
        .ok_or(ServiceError::MissingCredential(SECRET_FIELD))?;

    let username = Username::parse(username).map_err(ServiceError::from_policy)?;
    check_secret(secret).map_err(ServiceError::from_policy)?;
    Ok((username, secret))
}

fn group_field(raw: Option<&str>) -> ServiceResult<GroupId> {
    raw.filter(|v| !v.is_empty())
        .map(GroupId::new)
        .ok_or(ServiceError::MissingField(GROUP_FIELD))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionError;
    use crate::storage::CoinDb;

    fn addr() -> IpAddr {
        "1.2.3.4".parse().unwrap()
    }

    fn service() -> CoinService<CoinDb> {
        let db = Arc::new(CoinDb::open_temporary().unwrap());
        CoinService::new(db, ServiceConfig::default())
    }

    fn signed_in(svc: &CoinService<CoinDb>, name: &str) -> String {
        svc.register(Some(name), Some("hunter2")).unwrap();
        svc.login(Some(name), Some("hunter2"), addr()).unwrap().to_string()
    }

    #[test]
    fn register_rejects_duplicates_and_bad_fields() {
        let svc = service();
        svc.register(Some("alice"), Some("hunter2")).unwrap();

        assert_eq!(
            svc.register(Some("alice"), Some("x")).unwrap_err().code(),
            "identity_taken"
        );
        assert_eq!(
            svc.register(None, Some("x")).unwrap_err().code(),
            "missing_credential"
        );
        assert_eq!(
            svc.register(Some("bob"), Some("")).unwrap_err().code(),
            "missing_credential"
        );
        assert_eq!(
            svc.register(Some("b-o-b"), Some("x")).unwrap_err().code(),
            "malformed_identity"
        );
        assert_eq!(
            svc.register(Some("bob"), Some("two words")).unwrap_err().code(),
            "malformed_secret"
        );
    }

    #[test]
    fn login_outcomes() {
        let svc = service();
        svc.register(Some("alice"), Some("hunter2")).unwrap();

        assert_eq!(
            svc.login(Some("bob"), Some("hunter2"), addr()).unwrap_err().code(),
            "unknown_identity"
        );
        assert_eq!(
            svc.login(Some("alice"), Some("wrong"), addr()).unwrap_err().code(),
            "invalid_credentials"
        );
        assert!(svc.login(Some("alice"), Some("hunter2"), addr()).is_ok());
        assert_eq!(svc.sessions().len(), 1);
    }

    #[test]
    fn logout_revokes_token() {
        let svc = service();
        let token = signed_in(&svc, "alice");
        let creds = Credentials::new(Some("alice"), Some(&token), addr());

        svc.logout(&creds).unwrap();
        assert!(matches!(
            svc.create_group(&creds),
            Err(ServiceError::InvalidSession(SessionError::TokenNotFound))
        ));
    }

    #[test]
    fn group_id_is_checked_after_the_gate() {
        let svc = service();
        let token = signed_in(&svc, "alice");

        let anonymous = Credentials::new(None, None, addr());
        assert_eq!(
            svc.join(&anonymous, None).unwrap_err().code(),
            "missing_credential"
        );

        let creds = Credentials::new(Some("alice"), Some(&token), addr());
        assert!(matches!(
            svc.join(&creds, None),
            Err(ServiceError::MissingField("ID"))
        ));
        assert!(matches!(
            svc.pass_coin(&creds, Some("")),
            Err(ServiceError::MissingField("ID"))
        ));
    }

    #[test]
    fn full_group_flow() {
        let svc = service();
        let alice_token = signed_in(&svc, "alice");
        let bob_token = signed_in(&svc, "bob");
        let alice = Credentials::new(Some("alice"), Some(&alice_token), addr());
        let bob = Credentials::new(Some("bob"), Some(&bob_token), addr());

        let group = svc.create_group(&alice).unwrap();
        svc.join(&bob, Some(group.id.as_str())).unwrap();
        assert_eq!(
            svc.join(&bob, Some(group.id.as_str())).unwrap_err().code(),
            "already_member"
        );

        assert_eq!(
            svc.pass_coin(&bob, Some(group.id.as_str())).unwrap_err().code(),
            "not_authorized_holder"
        );

        let transfer = svc.pass_coin(&alice, Some(group.id.as_str())).unwrap();
        assert_eq!(transfer.new_holder.as_str(), "bob");
        assert_eq!(transfer.coin, 2);

        let seen = svc.group_of(&alice, "bob").unwrap();
        assert_eq!(seen.id, group.id);
        assert_eq!(seen.holder.as_str(), "bob");
    }

    #[test]
    fn group_of_unknown_member() {
        let svc = service();
        let token = signed_in(&svc, "alice");
        let creds = Credentials::new(Some("alice"), Some(&token), addr());

        assert_eq!(
            svc.group_of(&creds, "carol").unwrap_err().code(),
            "group_not_found"
        );
        assert_eq!(
            svc.group_of(&creds, "ca rol").unwrap_err().code(),
            "malformed_identity"
        );
    }

    #[test]
    fn storage_fault_fails_only_that_request() {
        use crate::storage::faulty::{fast_retry, FlakyDirectory};

        let dir = Arc::new(FlakyDirectory::new());
        let svc = CoinService::new(
            Arc::clone(&dir),
            ServiceConfig {
                retry: fast_retry(),
                ..ServiceConfig::default()
            },
        );
        svc.register(Some("alice"), Some("hunter2")).unwrap();
        let token = svc.login(Some("alice"), Some("hunter2"), addr()).unwrap().to_string();
        let alice = Credentials::new(Some("alice"), Some(&token), addr());
        let group = svc.create_group(&alice).unwrap();

        dir.fail_groups(true);
        for err in [
            svc.pass_coin(&alice, Some(group.id.as_str())).unwrap_err(),
            svc.join(&alice, Some("elsewhere")).unwrap_err(),
            svc.create_group(&alice).unwrap_err(),
        ] {
            assert!(matches!(err, ServiceError::PersistenceUnavailable(_)));
            assert_eq!(err.code(), "persistence_unavailable");
        }
        dir.fail_groups(false);

        dir.fail_users(true);
        assert_eq!(
            svc.login(Some("alice"), Some("hunter2"), addr()).unwrap_err().code(),
            "persistence_unavailable"
        );
        dir.fail_users(false);

        // Session and group both survived the outage.
        assert_eq!(svc.sessions().len(), 1);
        let transfer = svc.pass_coin(&alice, Some(group.id.as_str())).unwrap();
        assert_eq!(transfer.coin, 2);
        assert_eq!(dir.inner().group_count(), 1);
    }
}
