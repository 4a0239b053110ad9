use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::authority::Authority;
use crate::user_lookup::{SystemUserLookup, UserLookup};

pub const DEFAULT_PROC_ROOT: &str = "/";

/// File form of the authorizer settings.
///
/// The `/proc` root is not a key here; only test harnesses move it, through
/// [`AuthorizerConfig::with_proc_root`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthorizerSettings {
    /// Lets the authority prompt the requesting user. On by default; turning
    /// it off makes every check that needs authentication fail instead of
    /// prompting, for daemons serving only non-interactive clients.
    pub allow_interaction: bool,
    pub check_timeout_ms: Option<u64>,
}

impl Default for AuthorizerSettings {
    fn default() -> Self {
        Self {
            allow_interaction: true,
            check_timeout_ms: None,
        }
    }
}

impl AuthorizerSettings {
    pub fn check_timeout(&self) -> Option<Duration> {
        self.check_timeout_ms
            .filter(|millis| *millis > 0)
            .map(Duration::from_millis)
    }
}

/// Loads TOML settings; a missing file yields the defaults.
pub fn load_authorizer_settings(path: &Path) -> Result<AuthorizerSettings> {
    if !path.exists() {
        return Ok(AuthorizerSettings::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read authorizer settings {}", path.display()))?;
    toml::from_str::<AuthorizerSettings>(&raw)
        .with_context(|| format!("failed to parse authorizer settings {}", path.display()))
}

/// Construction-time inputs of an `Authorizer`.
#[derive(Clone)]
pub struct AuthorizerConfig {
    pub proc_root: PathBuf,
    /// Defaults to `true`; `false` is an opt-in for non-interactive daemons.
    pub allow_interaction: bool,
    pub check_timeout: Option<Duration>,
    pub authority: Arc<dyn Authority>,
    pub user_lookup: Arc<dyn UserLookup>,
}

impl AuthorizerConfig {
    /// Production defaults: real `/proc`, interactive prompts allowed, no
    /// deadline, passwd user lookup.
    pub fn new(authority: Arc<dyn Authority>) -> Self {
        Self {
            proc_root: PathBuf::from(DEFAULT_PROC_ROOT),
            allow_interaction: true,
            check_timeout: None,
            authority,
            user_lookup: Arc::new(SystemUserLookup),
        }
    }

    /// Applies file settings; the `/proc` root stays at the real `/`.
    pub fn from_settings(settings: &AuthorizerSettings, authority: Arc<dyn Authority>) -> Self {
        Self {
            allow_interaction: settings.allow_interaction,
            check_timeout: settings.check_timeout(),
            ..Self::new(authority)
        }
    }

    /// Points the process identity reader at a fake root. Test harnesses only.
    pub fn with_proc_root(mut self, proc_root: impl Into<PathBuf>) -> Self {
        self.proc_root = proc_root.into();
        self
    }

    pub fn with_user_lookup(mut self, user_lookup: Arc<dyn UserLookup>) -> Self {
        self.user_lookup = user_lookup;
        self
    }

    pub fn with_allow_interaction(mut self, allow_interaction: bool) -> Self {
        self.allow_interaction = allow_interaction;
        self
    }

    pub fn with_check_timeout(mut self, check_timeout: Option<Duration>) -> Self {
        self.check_timeout = check_timeout;
        self
    }
}

impl std::fmt::Debug for AuthorizerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizerConfig")
            .field("proc_root", &self.proc_root)
            .field("allow_interaction", &self.allow_interaction)
            .field("check_timeout", &self.check_timeout)
            .finish_non_exhaustive()
    }
}
