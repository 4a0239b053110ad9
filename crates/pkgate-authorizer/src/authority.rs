use std::collections::BTreeMap;

use async_trait::async_trait;
use thiserror::Error;

use crate::proc_stat::ProcessIdentitySnapshot;

pub const UNIX_PROCESS_SUBJECT_KIND: &str = "unix-process";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
/// Bitmask passed as the `flags` argument of `CheckAuthorization`.
pub struct CheckFlags(u32);

impl CheckFlags {
    pub const NONE: Self = Self(0);
    pub const ALLOW_USER_INTERACTION: Self = Self(0x01);

    pub fn interactive(allow: bool) -> Self {
        if allow {
            Self::ALLOW_USER_INTERACTION
        } else {
            Self::NONE
        }
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn allows_interaction(self) -> bool {
        self.0 & Self::ALLOW_USER_INTERACTION.0 != 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubjectDetails {
    pub pid: u32,
    pub start_time: u64,
    pub uid: u32,
}

/// Subject descriptor sent to the authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthoritySubject {
    pub kind: &'static str,
    pub details: SubjectDetails,
}

impl AuthoritySubject {
    /// Projects a live snapshot onto the `unix-process` subject.
    ///
    /// The authority takes the pid unsigned; a negative pid is sent as 0.
    pub fn unix_process(snapshot: &ProcessIdentitySnapshot) -> Self {
        Self {
            kind: UNIX_PROCESS_SUBJECT_KIND,
            details: SubjectDetails {
                pid: u32::try_from(snapshot.pid).unwrap_or(0),
                start_time: snapshot.start_time_ticks,
                uid: snapshot.uid,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AuthorityVerdict {
    pub is_authorized: bool,
    /// The authority could have prompted the user. Informational only.
    pub is_challenge: bool,
    pub details: BTreeMap<String, String>,
}

impl AuthorityVerdict {
    pub fn allowed() -> Self {
        Self {
            is_authorized: true,
            ..Self::default()
        }
    }

    pub fn denied() -> Self {
        Self::default()
    }

    pub fn challenge() -> Self {
        Self {
            is_challenge: true,
            ..Self::default()
        }
    }
}

#[derive(Debug, Error)]
pub enum AuthorityError {
    #[error("bus error: {0}")]
    Bus(#[from] zbus::Error),
    #[error("transport error: {0}")]
    Transport(String),
}

#[async_trait]
/// Trait contract for the external system authority.
///
/// Implementations perform one self-contained request/response exchange per
/// call and hold no per-call state, so one instance serves concurrent checks.
pub trait Authority: Send + Sync {
    async fn check_authorization(
        &self,
        subject: &AuthoritySubject,
        action_id: &str,
        flags: CheckFlags,
        cancellation_id: &str,
    ) -> Result<AuthorityVerdict, AuthorityError>;

    /// Withdraws a pending check issued with a non-empty `cancellation_id`.
    async fn cancel_check_authorization(&self, cancellation_id: &str) -> Result<(), AuthorityError> {
        let _ = cancellation_id;
        Ok(())
    }
}
