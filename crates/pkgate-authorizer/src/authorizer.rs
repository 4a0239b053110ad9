//! Authorization gate in front of every privileged daemon operation.
//!
//! A check runs strictly in order and stops at the first decisive step:
//!
//! ```text
//! credentials -> action id (self/other) -> uid 0 / always-allowed fast path
//!             -> /proc identity snapshot -> authority query -> allow | deny
//! ```
//!
//! Nothing is cached between checks. Process identity and authority policy can
//! both change between two requests, so each check re-reads both.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::action::Action;
use crate::authority::{Authority, AuthoritySubject, CheckFlags};
use crate::error::AuthorizationError;
use crate::proc_stat::ProcessIdentitySnapshot;
use crate::request::CheckRequest;
use crate::settings::AuthorizerConfig;

/// Bound on the best-effort cancel sent after a deadline elapses.
const CANCEL_GRACE: Duration = Duration::from_secs(2);

/// Gate deciding whether a request's peer may perform an action.
#[derive(Debug)]
pub struct Authorizer {
    config: AuthorizerConfig,
    cancellation_seq: AtomicU64,
}

impl Authorizer {
    pub fn new(config: AuthorizerConfig) -> Self {
        Self {
            config,
            cancellation_seq: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> &AuthorizerConfig {
        &self.config
    }

    /// Returns `Ok(())` when the request's peer may perform `action`.
    ///
    /// Applies the configured check timeout when one is set, and stops early
    /// when the request's cancellation token fires.
    pub async fn check_from_request(
        &self,
        request: &CheckRequest,
        action: &Action,
    ) -> Result<(), AuthorizationError> {
        self.guarded_check(request, action, self.config.check_timeout).await
    }

    /// Like [`Authorizer::check_from_request`], failing with
    /// `DeadlineExceeded` once `deadline` elapses.
    pub async fn check_with_deadline(
        &self,
        request: &CheckRequest,
        action: &Action,
        deadline: Duration,
    ) -> Result<(), AuthorizationError> {
        self.guarded_check(request, action, Some(deadline)).await
    }

    /// Runs the check under an optional deadline and the request's optional
    /// cancellation token.
    ///
    /// With either in force the authority call carries a unique cancellation
    /// id, and a check interrupted by either one, or dropped by its caller,
    /// is withdrawn at the authority so no prompt outlives the request.
    async fn guarded_check(
        &self,
        request: &CheckRequest,
        action: &Action,
        deadline: Option<Duration>,
    ) -> Result<(), AuthorizationError> {
        let cancellation = request.cancellation();
        if deadline.is_none() && cancellation.is_none() {
            return self.run_check(request, action, "").await;
        }

        let cancellation_id = self.next_cancellation_id();
        let pending =
            PendingCheck::new(Arc::clone(&self.config.authority), cancellation_id.clone());
        let check = self.run_check(request, action, &cancellation_id);
        let bounded = async {
            match deadline {
                Some(deadline) => tokio::time::timeout(deadline, check)
                    .await
                    .map_err(|_| AuthorizationError::DeadlineExceeded { deadline }),
                None => Ok(check.await),
            }
        };
        let outcome = match cancellation {
            Some(token) => tokio::select! {
                outcome = bounded => outcome,
                () = token.cancelled() => Err(AuthorizationError::Cancelled),
            },
            None => bounded.await,
        };
        pending.settle();

        match outcome {
            Ok(result) => result,
            Err(interrupted) => {
                tracing::warn!(
                    cancellation_id = cancellation_id.as_str(),
                    reason = interrupted.kind().as_str(),
                    "authorization check interrupted"
                );
                cancel_pending(self.config.authority.as_ref(), &cancellation_id).await;
                Err(interrupted)
            }
        }
    }

    fn next_cancellation_id(&self) -> String {
        let seq = self.cancellation_seq.fetch_add(1, Ordering::Relaxed);
        format!("pkgate-{}-{seq}", std::process::id())
    }

    async fn run_check(
        &self,
        request: &CheckRequest,
        action: &Action,
        cancellation_id: &str,
    ) -> Result<(), AuthorizationError> {
        let credentials = request
            .credentials()
            .ok_or(AuthorizationError::MissingCredentials)?;
        tracing::debug!(
            pid = credentials.pid,
            uid = credentials.uid,
            action = %action,
            "checking request peer authorization"
        );

        let target_uid = if action.targets_user() {
            let user_name = request
                .target_user()
                .ok_or(AuthorizationError::MissingTargetUser)?;
            Some(self.resolve_target_uid(user_name).await?)
        } else {
            None
        };
        let action_id = action.resolve_id(credentials.uid, target_uid);

        if credentials.uid == 0 {
            tracing::debug!(pid = credentials.pid, "authorized as administrator");
            return Ok(());
        }
        let Some(action_id) = action_id else {
            tracing::debug!(uid = credentials.uid, "action always allowed");
            return Ok(());
        };

        let snapshot =
            ProcessIdentitySnapshot::capture(&self.config.proc_root, credentials.pid, credentials.uid)
                .await
                .map_err(|error| AuthorizationError::from_proc_stat(credentials.pid, error))?;
        let subject = AuthoritySubject::unix_process(&snapshot);
        let flags = CheckFlags::interactive(self.config.allow_interaction);

        let verdict = self
            .config
            .authority
            .check_authorization(&subject, action_id, flags, cancellation_id)
            .await
            .map_err(|error| {
                tracing::warn!(action_id, error = %error, "authority call failed");
                AuthorizationError::AuthorityUnreachable(error)
            })?;
        tracing::debug!(
            pid = credentials.pid,
            start_time = snapshot.start_time_ticks,
            action_id,
            authorized = verdict.is_authorized,
            challenge = verdict.is_challenge,
            "authority verdict"
        );

        if !verdict.is_authorized {
            return Err(AuthorizationError::PermissionDenied {
                action_id: action_id.to_string(),
            });
        }
        Ok(())
    }

    /// Resolves the target user off the async runtime; NSS may block on a
    /// remote directory.
    async fn resolve_target_uid(&self, user_name: &str) -> Result<u32, AuthorizationError> {
        let lookup = Arc::clone(&self.config.user_lookup);
        let name = user_name.to_string();
        let resolved = tokio::task::spawn_blocking(move || lookup.lookup_uid(&name))
            .await
            .map_err(|error| AuthorizationError::UnknownUser {
                user: user_name.to_string(),
                reason: format!("lookup task failed: {error}"),
            })?;
        let uid = resolved.map_err(|error| AuthorizationError::UnknownUser {
            user: user_name.to_string(),
            reason: error.to_string(),
        })?;
        u32::try_from(uid).map_err(|_| AuthorizationError::UidOverflow {
            user: user_name.to_string(),
            uid,
        })
    }
}

/// Best-effort `CancelCheckAuthorization`, bounded by [`CANCEL_GRACE`].
async fn cancel_pending(authority: &dyn Authority, cancellation_id: &str) {
    let cancel = authority.cancel_check_authorization(cancellation_id);
    match tokio::time::timeout(CANCEL_GRACE, cancel).await {
        Ok(Ok(())) => {}
        Ok(Err(error)) => tracing::debug!(
            cancellation_id,
            error = %error,
            "authority cancel failed"
        ),
        Err(_) => tracing::debug!(cancellation_id, "authority cancel timed out"),
    }
}

/// Cancels a tagged authority check if its future is dropped unsettled.
struct PendingCheck {
    authority: Arc<dyn Authority>,
    cancellation_id: String,
    settled: bool,
}

impl PendingCheck {
    fn new(authority: Arc<dyn Authority>, cancellation_id: String) -> Self {
        Self {
            authority,
            cancellation_id,
            settled: false,
        }
    }

    fn settle(mut self) {
        self.settled = true;
    }
}

impl Drop for PendingCheck {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let authority = Arc::clone(&self.authority);
        let cancellation_id = std::mem::take(&mut self.cancellation_id);
        tracing::debug!(
            cancellation_id = cancellation_id.as_str(),
            "authorization check dropped before completion"
        );
        runtime.spawn(async move {
            cancel_pending(authority.as_ref(), &cancellation_id).await;
        });
    }
}
