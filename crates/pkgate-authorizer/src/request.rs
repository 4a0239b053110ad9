use tokio_util::sync::CancellationToken;

/// Process and user ids the transport attributed to the connecting peer.
///
/// Trusted as the transport's attestation of who connected, not as proof the
/// process is still the same one by check time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerCredentials {
    pub pid: i32,
    pub uid: u32,
}

/// Request-scoped inputs of one authorization check.
///
/// The optional cancellation token is the request context: cancelling it
/// aborts the check and withdraws any check pending at the authority.
#[derive(Debug, Clone, Default)]
pub struct CheckRequest {
    credentials: Option<PeerCredentials>,
    target_user: Option<String>,
    cancellation: Option<CancellationToken>,
}

impl CheckRequest {
    pub fn new(credentials: PeerCredentials) -> Self {
        Self {
            credentials: Some(credentials),
            target_user: None,
            cancellation: None,
        }
    }

    /// A request whose transport attached no credentials. Always rejected.
    pub fn without_credentials() -> Self {
        Self::default()
    }

    /// Names the user a self/other action operates on.
    pub fn on_user(mut self, user_name: impl Into<String>) -> Self {
        self.target_user = Some(user_name.into());
        self
    }

    /// Ties the check to the caller's cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub fn credentials(&self) -> Option<PeerCredentials> {
        self.credentials
    }

    pub fn target_user(&self) -> Option<&str> {
        self.target_user.as_deref()
    }

    pub fn cancellation(&self) -> Option<&CancellationToken> {
        self.cancellation.as_ref()
    }
}
