use std::collections::BTreeMap;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UserLookupError {
    #[error("unknown user")]
    NotFound,
    #[error("user database lookup failed: {0}")]
    Lookup(String),
}

/// Resolves a user name to its numeric uid.
///
/// Uids come back as `u64`: directory-service backends may hand out values
/// wider than the 32 bits the authority accepts, and the caller must see them
/// to reject them.
pub trait UserLookup: Send + Sync {
    fn lookup_uid(&self, user_name: &str) -> Result<u64, UserLookupError>;
}

#[derive(Debug, Clone, Copy, Default)]
/// Passwd/NSS lookup through `getpwnam_r`. May block on remote directories.
pub struct SystemUserLookup;

impl UserLookup for SystemUserLookup {
    fn lookup_uid(&self, user_name: &str) -> Result<u64, UserLookupError> {
        match nix::unistd::User::from_name(user_name) {
            Ok(Some(user)) => Ok(u64::from(user.uid.as_raw())),
            Ok(None) => Err(UserLookupError::NotFound),
            Err(errno) => Err(UserLookupError::Lookup(errno.to_string())),
        }
    }
}

#[derive(Debug, Clone, Default)]
/// Fixed name-to-uid table.
pub struct StaticUserLookup {
    users: BTreeMap<String, u64>,
}

impl StaticUserLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, user_name: impl Into<String>, uid: u64) -> Self {
        self.users.insert(user_name.into(), uid);
        self
    }
}

impl UserLookup for StaticUserLookup {
    fn lookup_uid(&self, user_name: &str) -> Result<u64, UserLookupError> {
        self.users
            .get(user_name)
            .copied()
            .ok_or(UserLookupError::NotFound)
    }
}
