// Single-flight credential acquisition

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::credential::{Credential, CredentialStore};
use super::login::{LoginError, LoginExchange};

type LoginHandle = Shared<BoxFuture<'static, Result<Credential, LoginError>>>;

/// Whether a login exchange is currently outstanding
pub enum RefreshState {
    Idle,
    /// Handle to the one outstanding login, polled by every waiter
    InFlight(LoginHandle),
}

impl RefreshState {
    pub fn is_in_flight(&self) -> bool {
        matches!(self, RefreshState::InFlight(_))
    }
}

/// Resets the state to `Idle` when the login task finishes or is torn down
struct IdleOnDrop(Arc<Mutex<RefreshState>>);

impl Drop for IdleOnDrop {
    fn drop(&mut self) {
        *self.0.lock() = RefreshState::Idle;
    }
}

/// Collapses concurrent credential acquisitions into a single login.
///
/// The first caller that finds no fresh credential spawns the login on its
/// own task and parks a shared handle in [`RefreshState::InFlight`]. Callers
/// arriving while it runs await the same handle and get the same token or
/// the same error. The spawned task writes the store and returns the state to
/// `Idle` before the handle resolves, so a cancelled initiator never strands
/// the other waiters and a failed login never wedges the coordinator.
pub struct RefreshCoordinator {
    store: Arc<CredentialStore>,
    exchange: Arc<dyn LoginExchange>,
    state: Arc<Mutex<RefreshState>>,
    login_timeout: Duration,
    login_attempts: Arc<AtomicU64>,
}

impl RefreshCoordinator {
    pub fn new(
        store: Arc<CredentialStore>,
        exchange: Arc<dyn LoginExchange>,
        login_timeout: Duration,
    ) -> Self {
        Self {
            store,
            exchange,
            state: Arc::new(Mutex::new(RefreshState::Idle)),
            login_timeout,
            login_attempts: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    /// Number of login exchanges started since construction
    pub fn login_attempts(&self) -> u64 {
        self.login_attempts.load(Ordering::SeqCst)
    }

    pub fn is_refreshing(&self) -> bool {
        self.state.lock().is_in_flight()
    }

    /// Valid credential as of now
    pub async fn ensure_valid(&self) -> Result<Credential, LoginError> {
        self.ensure_valid_at(Utc::now()).await
    }

    /// Valid credential as of `now`, logging in at most once across all callers
    pub async fn ensure_valid_at(&self, now: DateTime<Utc>) -> Result<Credential, LoginError> {
        if let Some(credential) = self.store.fresh(now) {
            return Ok(credential);
        }

        let handle = {
            let mut state = self.state.lock();

            // A refresh may have completed between the check above and the lock
            if let Some(credential) = self.store.fresh(now) {
                return Ok(credential);
            }

            match &*state {
                RefreshState::InFlight(handle) => {
                    tracing::debug!("Joining in-flight Smartflo login");
                    handle.clone()
                }
                RefreshState::Idle => {
                    let handle = self.start_login(now);
                    *state = RefreshState::InFlight(handle.clone());
                    handle
                }
            }
        };

        handle.await
    }

    /// Valid credential after Smartflo refused `rejected`.
    ///
    /// Only clears the store if it still holds the rejected token, so calls
    /// whose 401 arrives after another caller already refreshed reuse the
    /// new token instead of forcing one more login.
    pub async fn reauthorize(&self, rejected: &Credential) -> Result<Credential, LoginError> {
        if self.store.invalidate_if(rejected.token()) {
            tracing::debug!("Dropped rejected Smartflo credential");
        }
        self.ensure_valid().await
    }

    /// Spawn the login task. Caller must hold the state lock.
    fn start_login(&self, now: DateTime<Utc>) -> LoginHandle {
        let attempt = self.login_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::info!(attempt, "No fresh Smartflo credential, starting login");

        let store = Arc::clone(&self.store);
        let exchange = Arc::clone(&self.exchange);
        let reset = IdleOnDrop(Arc::clone(&self.state));
        let timeout = self.login_timeout;

        let task = tokio::spawn(async move {
            let _reset = reset;

            let outcome = match tokio::time::timeout(timeout, exchange.login()).await {
                Ok(outcome) => outcome,
                Err(_) => Err(LoginError::Timeout(timeout)),
            };

            match outcome {
                Ok(grant) => {
                    let credential = store.set(grant.access_token, grant.expires_in, now);
                    if !credential.is_fresh(now) {
                        tracing::warn!(
                            expires_in = grant.expires_in,
                            safety_margin = store.safety_margin_secs(),
                            "Token lifetime is shorter than the safety margin"
                        );
                    }
                    tracing::info!(
                        "Smartflo credential refreshed, usable until {}",
                        credential.expires_at().to_rfc3339()
                    );
                    Ok(credential)
                }
                Err(e) => {
                    tracing::error!("Smartflo login failed: {}", e);
                    Err(e)
                }
            }
        });

        async move {
            match task.await {
                Ok(outcome) => outcome,
                Err(e) => Err(LoginError::Aborted(e.to_string())),
            }
        }
        .boxed()
        .shared()
    }
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedLogin;
    use super::*;
    use chrono::Duration as ChronoDuration;
    use futures::future::join_all;

    fn coordinator(login: Arc<ScriptedLogin>) -> Arc<RefreshCoordinator> {
        Arc::new(RefreshCoordinator::new(
            Arc::new(CredentialStore::new(300)),
            login,
            Duration::from_secs(5),
        ))
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_login() {
        let login = Arc::new(ScriptedLogin::new());
        let coord = coordinator(login.clone());
        let now = Utc::now();

        let results = join_all((0..25).map(|_| {
            let coord = coord.clone();
            tokio::spawn(async move { coord.ensure_valid_at(now).await })
        }))
        .await;

        assert_eq!(login.call_count(), 1);
        assert_eq!(coord.login_attempts(), 1);
        for result in results {
            assert_eq!(result.unwrap().unwrap().token(), "token-1");
        }
        assert!(!coord.is_refreshing());
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_error() {
        let login = Arc::new(ScriptedLogin::new().failing_on(&[1]));
        let coord = coordinator(login.clone());
        let now = Utc::now();

        let results = join_all((0..10).map(|_| coord.ensure_valid_at(now))).await;

        assert_eq!(login.call_count(), 1);
        for result in results {
            assert!(matches!(
                result,
                Err(LoginError::Rejected { status: 401, .. })
            ));
        }
    }

    #[tokio::test]
    async fn test_fresh_credential_skips_login() {
        let login = Arc::new(ScriptedLogin::new());
        let coord = coordinator(login.clone());
        let now = Utc::now();
        coord.store().set("cached", 3600, now);

        let credential = coord.ensure_valid_at(now + ChronoDuration::seconds(60)).await.unwrap();
        assert_eq!(credential.token(), "cached");
        assert_eq!(login.call_count(), 0);
    }

    #[tokio::test]
    async fn test_margin_forces_relogin() {
        let login = Arc::new(ScriptedLogin::new());
        let coord = coordinator(login.clone());
        let t = Utc::now();

        // 400s lifetime minus 300s margin leaves 100s of use
        coord.store().set("short-lived", 400, t);
        let credential = coord.ensure_valid_at(t + ChronoDuration::seconds(350)).await.unwrap();

        assert_eq!(login.call_count(), 1);
        assert_eq!(credential.token(), "token-1");
    }

    #[tokio::test]
    async fn test_failed_login_does_not_wedge_state() {
        let login = Arc::new(ScriptedLogin::new().failing_on(&[1]));
        let coord = coordinator(login.clone());
        let now = Utc::now();

        assert!(coord.ensure_valid_at(now).await.is_err());
        assert!(!coord.is_refreshing());

        let credential = coord.ensure_valid_at(now).await.unwrap();
        assert_eq!(credential.token(), "token-2");
        assert_eq!(login.call_count(), 2);
    }

    #[tokio::test]
    async fn test_login_timeout_resets_state() {
        let login = Arc::new(ScriptedLogin::new().with_delay(Duration::from_secs(10)));
        let coord = Arc::new(RefreshCoordinator::new(
            Arc::new(CredentialStore::new(300)),
            login.clone(),
            Duration::from_millis(50),
        ));

        let err = coord.ensure_valid_at(Utc::now()).await.unwrap_err();
        assert_eq!(err, LoginError::Timeout(Duration::from_millis(50)));
        assert_eq!(err.to_string(), "login timed out after 50ms");
        assert!(!coord.is_refreshing());
        assert!(coord.store().get().is_none());
    }

    #[tokio::test]
    async fn test_cancelled_initiator_does_not_cancel_refresh() {
        let login = Arc::new(ScriptedLogin::new().with_delay(Duration::from_millis(200)));
        let coord = coordinator(login.clone());
        let now = Utc::now();

        let initiator = {
            let coord = coord.clone();
            tokio::spawn(async move { coord.ensure_valid_at(now).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(coord.is_refreshing());

        let waiter = {
            let coord = coord.clone();
            tokio::spawn(async move { coord.ensure_valid_at(now).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        initiator.abort();

        let credential = waiter.await.unwrap().unwrap();
        assert_eq!(credential.token(), "token-1");
        assert_eq!(login.call_count(), 1);
        assert!(!coord.is_refreshing());
    }

    #[tokio::test]
    async fn test_invalidate_triggers_new_login() {
        let login = Arc::new(ScriptedLogin::new());
        let coord = coordinator(login.clone());
        let now = Utc::now();

        assert_eq!(coord.ensure_valid_at(now).await.unwrap().token(), "token-1");
        coord.store().invalidate();
        assert_eq!(coord.ensure_valid_at(now).await.unwrap().token(), "token-2");
        assert_eq!(login.call_count(), 2);
    }

    #[tokio::test]
    async fn test_huge_expires_in_is_cached() {
        let login = Arc::new(ScriptedLogin::new().with_expires_in(10_000_000_000_000_000));
        let coord = coordinator(login.clone());
        let now = Utc::now();

        let credential = coord.ensure_valid_at(now).await.unwrap();
        assert_eq!(credential.token(), "token-1");
        assert!(coord.store().is_fresh(now + ChronoDuration::days(365)));

        coord.ensure_valid_at(now).await.unwrap();
        assert_eq!(login.call_count(), 1);
    }

    #[tokio::test]
    async fn test_late_rejection_keeps_refreshed_token() {
        let login = Arc::new(ScriptedLogin::new());
        let coord = coordinator(login.clone());

        let stale = coord.ensure_valid().await.unwrap();
        assert_eq!(stale.token(), "token-1");

        // First caller to see the 401 refreshes
        let refreshed = coord.reauthorize(&stale).await.unwrap();
        assert_eq!(refreshed.token(), "token-2");

        // A second 401 for the same stale token arrives afterwards
        let reused = coord.reauthorize(&stale).await.unwrap();
        assert_eq!(reused.token(), "token-2");
        assert_eq!(login.call_count(), 2);
    }

    #[tokio::test]
    async fn test_reauthorize_replaces_rejected_token() {
        let login = Arc::new(ScriptedLogin::new());
        let coord = coordinator(login.clone());

        let current = coord.ensure_valid().await.unwrap();
        let next = coord.reauthorize(&current).await.unwrap();
        assert_eq!(next.token(), "token-2");
        assert_eq!(login.call_count(), 2);
    }

    #[tokio::test]
    async fn test_short_lived_grant_is_still_returned() {
        let login = Arc::new(ScriptedLogin::new().with_expires_in(60));
        let coord = coordinator(login.clone());

        let credential = coord.ensure_valid_at(Utc::now()).await.unwrap();
        assert_eq!(credential.token(), "token-1");
    }
}
