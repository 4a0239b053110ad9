//! Authorization failure taxonomy.
//!
//! Every variant displays as `permission denied: <cause>`, so a caller that
//! forwards the error to its client reports one uniform denial. The variant
//! itself keeps the cause for logs; [`AuthorizationError::kind`] classifies it.

use std::time::Duration;

use thiserror::Error;

use crate::authority::AuthorityError;
use crate::proc_stat::{ProcStatError, StatParseError};

pub const PERMISSION_DENIED: &str = "permission denied";

#[derive(Debug, Error)]
/// Enumerates supported `AuthorizationError` values.
pub enum AuthorizationError {
    #[error("permission denied: request carries no peer credentials")]
    MissingCredentials,

    #[error("permission denied: request to act on a user should have a user name attached")]
    MissingTargetUser,

    #[error("permission denied: couldn't retrieve user {user:?}: {reason}")]
    UnknownUser { user: String, reason: String },

    #[error("permission denied: uid {uid} of user {user:?} is too large for a 32-bit uid")]
    UidOverflow { user: String, uid: u64 },

    #[error("permission denied: process {pid} not found: {source}")]
    ProcessNotFound {
        pid: i32,
        #[source]
        source: std::io::Error,
    },

    #[error("permission denied: can't determine start time of process {pid}: {source}")]
    ParseError {
        pid: i32,
        #[source]
        source: StatParseError,
    },

    #[error("permission denied: call to authority failed: {0}")]
    AuthorityUnreachable(#[source] AuthorityError),

    #[error("permission denied: authority denied {action_id:?}")]
    PermissionDenied { action_id: String },

    #[error("permission denied: check did not complete within {deadline:?}")]
    DeadlineExceeded { deadline: Duration },

    #[error("permission denied: request was cancelled before the check completed")]
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DenialKind {
    MissingCredentials,
    MissingTargetUser,
    UnknownUser,
    UidOverflow,
    ProcessNotFound,
    ParseError,
    AuthorityUnreachable,
    PermissionDenied,
    DeadlineExceeded,
    Cancelled,
}

impl DenialKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingCredentials => "missing_credentials",
            Self::MissingTargetUser => "missing_target_user",
            Self::UnknownUser => "unknown_user",
            Self::UidOverflow => "uid_overflow",
            Self::ProcessNotFound => "process_not_found",
            Self::ParseError => "parse_error",
            Self::AuthorityUnreachable => "authority_unreachable",
            Self::PermissionDenied => "permission_denied",
            Self::DeadlineExceeded => "deadline_exceeded",
            Self::Cancelled => "cancelled",
        }
    }
}

impl AuthorizationError {
    #[must_use]
    pub fn kind(&self) -> DenialKind {
        match self {
            Self::MissingCredentials => DenialKind::MissingCredentials,
            Self::MissingTargetUser => DenialKind::MissingTargetUser,
            Self::UnknownUser { .. } => DenialKind::UnknownUser,
            Self::UidOverflow { .. } => DenialKind::UidOverflow,
            Self::ProcessNotFound { .. } => DenialKind::ProcessNotFound,
            Self::ParseError { .. } => DenialKind::ParseError,
            Self::AuthorityUnreachable(_) => DenialKind::AuthorityUnreachable,
            Self::PermissionDenied { .. } => DenialKind::PermissionDenied,
            Self::DeadlineExceeded { .. } => DenialKind::DeadlineExceeded,
            Self::Cancelled => DenialKind::Cancelled,
        }
    }

    /// Detail-free message for untrusted clients.
    pub fn public_message(&self) -> &'static str {
        PERMISSION_DENIED
    }

    pub(crate) fn from_proc_stat(pid: i32, error: ProcStatError) -> Self {
        match error {
            ProcStatError::NotFound { source, .. } => Self::ProcessNotFound { pid, source },
            ProcStatError::Parse(source) => Self::ParseError { pid, source },
        }
    }
}
