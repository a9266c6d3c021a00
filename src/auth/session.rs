//! Session lifecycle over the per-principal token version
//!
//! Every login, refresh and logout moves the principal's token version
//! forward by exactly one. Tokens embed the version they were minted at and
//! are only honoured while it still matches the stored value, so a single
//! increment revokes every outstanding token for that principal.
//!
//! Limitation: sessions are not independent per device. Logging in on a
//! second device, or refreshing on one, invalidates tokens held elsewhere.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::lifetime::{Lifetime, LifetimePolicy};
use super::password::CredentialHasher;
use super::permissions::PermissionResolver;
use super::token::{AccessClaims, RefreshClaims, TokenKeys};
use crate::store::{bounded, normalize_email, CredentialStore, Principal, PrincipalView};
use crate::types::WicketError;

/// Access and refresh token with the lifetimes they were minted for
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub access_token_expires_in: Lifetime,
    pub refresh_token_expires_in: Lifetime,
}

/// Result of a successful login
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub principal: PrincipalView,
    pub tokens: TokenPair,
    pub remember_me: bool,
}

/// Result of a successful refresh
#[derive(Debug, Clone)]
pub struct RefreshOutcome {
    pub principal: PrincipalView,
    pub tokens: TokenPair,
    /// Tier carried over from the refresh token, never from the request
    pub remember_me: bool,
}

/// A principal whose access token checked out against the live store
#[derive(Debug, Clone)]
pub struct Authenticated {
    pub principal: PrincipalView,
    pub claims: AccessClaims,
}

impl Authenticated {
    pub fn id(&self) -> &str {
        &self.principal.id
    }
}

/// Orchestrates login, refresh, logout and access-token checks
#[derive(Clone)]
pub struct SessionManager {
    credentials: Arc<dyn CredentialStore>,
    resolver: PermissionResolver,
    keys: TokenKeys,
    hasher: Arc<dyn CredentialHasher>,
    policy: LifetimePolicy,
    timeout: Duration,
}

impl SessionManager {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        resolver: PermissionResolver,
        keys: TokenKeys,
        hasher: Arc<dyn CredentialHasher>,
        policy: LifetimePolicy,
        timeout: Duration,
    ) -> Self {
        Self {
            credentials,
            resolver,
            keys,
            hasher,
            policy,
            timeout,
        }
    }

    pub fn policy(&self) -> &LifetimePolicy {
        &self.policy
    }

    pub fn resolver(&self) -> &PermissionResolver {
        &self.resolver
    }

    /// Verify credentials and open a new session.
    ///
    /// Unknown email, disabled account and wrong password all fail with the
    /// same `InvalidCredentials`; the reason is only logged.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        remember_me: bool,
    ) -> Result<LoginOutcome, WicketError> {
        let email = normalize_email(email);
        let found = bounded(
            self.timeout,
            "find_by_email",
            self.credentials.find_by_email(&email),
        )
        .await?;

        let principal = match found {
            Some(p) if p.is_active => p,
            Some(_) => {
                warn!(email = %email, "Login failed - account inactive");
                return Err(WicketError::InvalidCredentials);
            }
            None => {
                warn!(email = %email, "Login failed - unknown email");
                return Err(WicketError::InvalidCredentials);
            }
        };

        if !self.verify_password(password, &principal.password_hash).await? {
            warn!(email = %email, "Login failed - invalid password");
            return Err(WicketError::InvalidCredentials);
        }

        // A resolver failure must not revoke other sessions
        let role = self.resolver.primary_role_id(&principal.id).await?;

        let version = bounded(
            self.timeout,
            "advance_token_version",
            self.credentials.advance_token_version(&principal.id, None),
        )
        .await?
        .ok_or(WicketError::InvalidCredentials)?;

        let tokens = self.issue(&principal, role, version, remember_me)?;
        info!(principal = %principal.id, remember_me, "Login successful");

        Ok(LoginOutcome {
            principal: principal.view(),
            tokens,
            remember_me,
        })
    }

    /// Rotate a refresh token into a fresh pair.
    ///
    /// The presented token becomes unusable: its version is consumed by a
    /// compare-and-increment, so of two racing refreshes only one wins.
    pub async fn refresh(&self, refresh_token: &str) -> Result<RefreshOutcome, WicketError> {
        let signed = self
            .keys
            .refresh
            .verify::<RefreshClaims>(refresh_token)
            .map_err(|e| {
                debug!(error = %e, "Refresh token rejected");
                WicketError::InvalidRefreshToken
            })?;
        let RefreshClaims { sub, ver, remember } = signed.claims;

        let principal = bounded(self.timeout, "find_by_id", self.credentials.find_by_id(&sub))
            .await?
            .filter(|p| p.is_active)
            .ok_or(WicketError::InvalidRefreshToken)?;

        if principal.token_version != ver {
            warn!(
                principal = %sub,
                presented = ver,
                current = principal.token_version,
                "Stale refresh token presented"
            );
            return Err(WicketError::InvalidRefreshToken);
        }

        let role = self.resolver.primary_role_id(&sub).await?;

        let version = bounded(
            self.timeout,
            "advance_token_version",
            self.credentials.advance_token_version(&sub, Some(ver)),
        )
        .await?
        .ok_or_else(|| {
            warn!(principal = %sub, "Refresh lost a concurrent rotation");
            WicketError::InvalidRefreshToken
        })?;

        let tokens = self.issue(&principal, role, version, remember)?;
        debug!(principal = %sub, version, "Refresh token rotated");

        Ok(RefreshOutcome {
            principal: principal.view(),
            tokens,
            remember_me: remember,
        })
    }

    /// Revoke every outstanding token of a principal. Never fails.
    pub async fn logout(&self, principal_id: &str) {
        let result = bounded(
            self.timeout,
            "advance_token_version",
            self.credentials.advance_token_version(principal_id, None),
        )
        .await;

        match result {
            Ok(Some(version)) => info!(principal = %principal_id, version, "Logged out"),
            Ok(None) => debug!(principal = %principal_id, "Logout for unknown principal"),
            Err(e) => warn!(principal = %principal_id, error = %e, "Logout could not advance token version"),
        }
    }

    /// Check an access token against the live token version.
    ///
    /// Token problems and stale or disabled principals all fail with
    /// `InvalidAccessToken`. Store outages surface as `Unavailable`.
    pub async fn authenticate(&self, access_token: &str) -> Result<Authenticated, WicketError> {
        let signed = self
            .keys
            .access
            .verify::<AccessClaims>(access_token)
            .map_err(|e| {
                debug!(error = %e, "Access token rejected");
                WicketError::InvalidAccessToken
            })?;

        let principal = bounded(
            self.timeout,
            "find_by_id",
            self.credentials.find_by_id(&signed.claims.sub),
        )
        .await?
        .filter(|p| p.is_active && p.token_version == signed.claims.ver)
        .ok_or(WicketError::InvalidAccessToken)?;

        Ok(Authenticated {
            principal: principal.view(),
            claims: signed.claims,
        })
    }

    /// Argon2 is CPU-heavy; keep it off the async workers
    async fn verify_password(&self, password: &str, hash: &str) -> Result<bool, WicketError> {
        let hasher = Arc::clone(&self.hasher);
        let password = password.to_string();
        let hash = hash.to_string();

        tokio::task::spawn_blocking(move || hasher.verify(&password, &hash))
            .await
            .map_err(|e| WicketError::Internal(format!("password verification task failed: {e}")))?
    }

    fn issue(
        &self,
        principal: &Principal,
        role: Option<String>,
        version: u64,
        remember_me: bool,
    ) -> Result<TokenPair, WicketError> {
        let access_lifetime = self.policy.access.clone();
        let refresh_lifetime = self.policy.refresh_for(remember_me).clone();

        let access_token = self.keys.access.sign(
            AccessClaims {
                sub: principal.id.clone(),
                email: principal.email.clone(),
                role,
                ver: version,
            },
            access_lifetime.duration(),
        )?;
        let refresh_token = self.keys.refresh.sign(
            RefreshClaims {
                sub: principal.id.clone(),
                ver: version,
                remember: remember_me,
            },
            refresh_lifetime.duration(),
        )?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            access_token_expires_in: access_lifetime,
            refresh_token_expires_in: refresh_lifetime,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::token::Signed;
    use crate::auth::Argon2Hasher;
    use crate::store::{
        MemoryStore, Permission, PermissionGrant, Role, RoleAssignment, RoleStore, StoreResult,
    };

    /// Cheap stand-in so tests don't pay for Argon2
    struct PlainHasher;

    impl CredentialHasher for PlainHasher {
        fn hash(&self, password: &str) -> Result<String, WicketError> {
            Ok(format!("plain:{password}"))
        }

        fn verify(&self, password: &str, hash: &str) -> Result<bool, WicketError> {
            Ok(hash == format!("plain:{password}"))
        }
    }

    async fn fixture() -> (Arc<MemoryStore>, SessionManager) {
        let store = Arc::new(MemoryStore::new());
        store
            .put_principal(Principal::new("p-1", "user@test.az", "plain:password1".into()))
            .unwrap();
        let mut disabled = Principal::new("p-2", "off@test.az", "plain:password1".into());
        disabled.is_active = false;
        store.put_principal(disabled).unwrap();

        store
            .insert_role(Role {
                id: "r-admin".into(),
                name: "Admin".into(),
                description: None,
                is_active: true,
            })
            .unwrap();
        store.assign_role("p-1", "r-admin").await.unwrap();

        let manager = manager_over(store.clone(), Duration::from_secs(1));
        (store, manager)
    }

    fn manager_over(store: Arc<MemoryStore>, timeout: Duration) -> SessionManager {
        SessionManager::new(
            store.clone(),
            PermissionResolver::new(store, timeout),
            TokenKeys::new_dev(),
            Arc::new(PlainHasher),
            LifetimePolicy::default(),
            timeout,
        )
    }

    #[tokio::test]
    async fn test_login_bumps_version_and_embeds_it() {
        let (store, manager) = fixture().await;

        let outcome = manager.login(" USER@test.az", "password1", false).await.unwrap();
        assert_eq!(outcome.principal.id, "p-1");

        let stored = store.find_by_id("p-1").await.unwrap().unwrap();
        assert_eq!(stored.token_version, 1);

        let keys = TokenKeys::new_dev();
        let access: Signed<AccessClaims> = keys.access.verify(&outcome.tokens.access_token).unwrap();
        assert_eq!(access.claims.ver, 1);
        assert_eq!(access.claims.role.as_deref(), Some("r-admin"));
        assert_eq!(access.exp - access.iat, 15 * 60);
    }

    #[tokio::test]
    async fn test_login_failures_are_indistinguishable() {
        let (_store, manager) = fixture().await;

        let unknown = manager.login("nobody@test.az", "password1", false).await.unwrap_err();
        let wrong = manager.login("user@test.az", "password2", false).await.unwrap_err();
        let inactive = manager.login("off@test.az", "password1", false).await.unwrap_err();

        for err in [&unknown, &wrong, &inactive] {
            assert!(matches!(err, WicketError::InvalidCredentials));
        }
        assert_eq!(unknown.public_message(), wrong.public_message());
        assert_eq!(wrong.public_message(), inactive.public_message());
    }

    #[tokio::test]
    async fn test_rotated_refresh_token_cannot_be_reused() {
        let (_store, manager) = fixture().await;
        let login = manager.login("user@test.az", "password1", false).await.unwrap();

        let first = manager.refresh(&login.tokens.refresh_token).await.unwrap();
        assert_ne!(first.tokens.refresh_token, login.tokens.refresh_token);

        let reused = manager.refresh(&login.tokens.refresh_token).await.unwrap_err();
        assert!(matches!(reused, WicketError::InvalidRefreshToken));

        assert!(manager.refresh(&first.tokens.refresh_token).await.is_ok());
    }

    #[tokio::test]
    async fn test_logout_invalidates_access_token() {
        let (_store, manager) = fixture().await;
        let login = manager.login("user@test.az", "password1", false).await.unwrap();

        let authed = manager.authenticate(&login.tokens.access_token).await.unwrap();
        assert_eq!(authed.id(), "p-1");

        manager.logout("p-1").await;

        let err = manager.authenticate(&login.tokens.access_token).await.unwrap_err();
        assert!(matches!(err, WicketError::InvalidAccessToken));
        let err = manager.refresh(&login.tokens.refresh_token).await.unwrap_err();
        assert!(matches!(err, WicketError::InvalidRefreshToken));
    }

    #[tokio::test]
    async fn test_logout_unknown_principal_is_silent() {
        let (_store, manager) = fixture().await;
        manager.logout("ghost").await;
    }

    #[tokio::test]
    async fn test_remember_tier_survives_refresh() {
        let (_store, manager) = fixture().await;
        let keys = TokenKeys::new_dev();

        let short = manager.login("user@test.az", "password1", false).await.unwrap();
        assert_eq!(short.tokens.refresh_token_expires_in.label, "7d");

        let long = manager.login("user@test.az", "password1", true).await.unwrap();
        assert_eq!(long.tokens.refresh_token_expires_in.label, "30d");

        let rotated = manager.refresh(&long.tokens.refresh_token).await.unwrap();
        assert!(rotated.remember_me);
        assert_eq!(rotated.tokens.refresh_token_expires_in.label, "30d");

        let signed: Signed<RefreshClaims> =
            keys.refresh.verify(&rotated.tokens.refresh_token).unwrap();
        assert!(signed.claims.remember);
        assert_eq!(signed.exp - signed.iat, 30 * 24 * 60 * 60);
    }

    #[tokio::test]
    async fn test_access_token_is_not_a_refresh_token() {
        let (_store, manager) = fixture().await;
        let login = manager.login("user@test.az", "password1", false).await.unwrap();

        let err = manager.refresh(&login.tokens.access_token).await.unwrap_err();
        assert!(matches!(err, WicketError::InvalidRefreshToken));
        let err = manager.authenticate(&login.tokens.refresh_token).await.unwrap_err();
        assert!(matches!(err, WicketError::InvalidAccessToken));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_refresh_single_winner() {
        let (_store, manager) = fixture().await;
        let login = manager.login("user@test.az", "password1", false).await.unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let manager = manager.clone();
                let token = login.tokens.refresh_token.clone();
                tokio::spawn(async move { manager.refresh(&token).await })
            })
            .collect();

        let mut successes = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => successes += 1,
                Err(e) => assert!(matches!(e, WicketError::InvalidRefreshToken)),
            }
        }
        assert_eq!(successes, 1);
    }

    #[tokio::test]
    async fn test_deactivated_principal_loses_session() {
        let (store, manager) = fixture().await;
        let login = manager.login("user@test.az", "password1", false).await.unwrap();

        let mut principal = store.find_by_id("p-1").await.unwrap().unwrap();
        principal.is_active = false;
        store.save(&principal).await.unwrap();

        assert!(matches!(
            manager.authenticate(&login.tokens.access_token).await.unwrap_err(),
            WicketError::InvalidAccessToken
        ));
        assert!(matches!(
            manager.refresh(&login.tokens.refresh_token).await.unwrap_err(),
            WicketError::InvalidRefreshToken
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_store_is_retryable() {
        let store = Arc::new(MemoryStore::with_latency(Duration::from_secs(60)));
        let manager = manager_over(store, Duration::from_millis(200));

        let err = manager.login("user@test.az", "password1", false).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(err.status_code(), hyper::StatusCode::SERVICE_UNAVAILABLE);
    }

    /// Role store whose every lookup outlives any sane timeout
    struct HungRoles;

    #[async_trait::async_trait]
    impl RoleStore for HungRoles {
        async fn role_assignments_for(&self, _: &str) -> StoreResult<Vec<RoleAssignment>> {
            std::future::pending().await
        }

        async fn grants_for_roles(&self, _: &[String]) -> StoreResult<Vec<PermissionGrant>> {
            std::future::pending().await
        }

        async fn roles_by_id(&self, _: &[String]) -> StoreResult<Vec<Role>> {
            std::future::pending().await
        }

        async fn permissions_by_id(&self, _: &[String]) -> StoreResult<Vec<Permission>> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_role_outage_keeps_existing_sessions() {
        let (store, manager) = fixture().await;
        let first = manager.login("user@test.az", "password1", false).await.unwrap();

        let stalled = SessionManager::new(
            store.clone(),
            PermissionResolver::new(Arc::new(HungRoles), Duration::from_millis(200)),
            TokenKeys::new_dev(),
            Arc::new(PlainHasher),
            LifetimePolicy::default(),
            Duration::from_millis(200),
        );

        let err = stalled.login("user@test.az", "password1", false).await.unwrap_err();
        assert!(err.is_retryable());
        let err = stalled.refresh(&first.tokens.refresh_token).await.unwrap_err();
        assert!(err.is_retryable());

        // Neither failure consumed a version
        assert_eq!(store.find_by_id("p-1").await.unwrap().unwrap().token_version, 1);
        manager.authenticate(&first.tokens.access_token).await.unwrap();
        manager.refresh(&first.tokens.refresh_token).await.unwrap();
    }

    #[tokio::test]
    async fn test_argon2_hasher_end_to_end() {
        let store = Arc::new(MemoryStore::new());
        let hash = Argon2Hasher.hash("correct-horse").unwrap();
        store
            .put_principal(Principal::new("p-9", "argon@test.az", hash))
            .unwrap();

        let manager = SessionManager::new(
            store.clone(),
            PermissionResolver::new(store, Duration::from_secs(1)),
            TokenKeys::new_dev(),
            Arc::new(Argon2Hasher),
            LifetimePolicy::default(),
            Duration::from_secs(5),
        );

        let outcome = manager.login("argon@test.az", "correct-horse", false).await.unwrap();
        assert!(outcome.tokens.access_token_expires_in.millis > 0);
        assert!(manager.login("argon@test.az", "wrong-horse", false).await.is_err());
    }
}
