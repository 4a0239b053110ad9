use std::borrow::Cow;
use std::fmt;

/// Privileged operation identified by the ids the system authority understands.
///
/// A plain action carries one id. A self/other action carries two ids and is
/// resolved per request depending on whether the caller targets itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Bypasses every check; no authority call is made.
    AlwaysAllowed,
    Plain {
        id: Cow<'static, str>,
    },
    SelfOrOther {
        self_id: Cow<'static, str>,
        other_id: Cow<'static, str>,
    },
}

impl Action {
    pub const fn plain(id: &'static str) -> Self {
        Self::Plain {
            id: Cow::Borrowed(id),
        }
    }

    /// Both ids must be non-empty; catalog constants are checked at compile time.
    pub const fn self_or_other(self_id: &'static str, other_id: &'static str) -> Self {
        assert!(
            !self_id.is_empty() && !other_id.is_empty(),
            "self/other action ids must be non-empty"
        );
        Self::SelfOrOther {
            self_id: Cow::Borrowed(self_id),
            other_id: Cow::Borrowed(other_id),
        }
    }

    /// Builds a plain action from a runtime id, e.g. one read from configuration.
    pub fn plain_owned(id: impl Into<String>) -> Self {
        Self::Plain {
            id: Cow::Owned(id.into()),
        }
    }

    pub fn is_always_allowed(&self) -> bool {
        matches!(self, Self::AlwaysAllowed)
    }

    /// True when the action needs a target user to pick its id.
    pub fn targets_user(&self) -> bool {
        matches!(self, Self::SelfOrOther { .. })
    }

    /// Returns the id to send to the authority for this request.
    ///
    /// A self/other action resolves to `self_id` only when the target uid is
    /// known and equals the caller uid; anything else resolves to `other_id`.
    /// [`Action::AlwaysAllowed`] has no id.
    pub fn resolve_id(&self, caller_uid: u32, target_uid: Option<u32>) -> Option<&str> {
        match self {
            Self::AlwaysAllowed => None,
            Self::Plain { id } => Some(id.as_ref()),
            Self::SelfOrOther { self_id, other_id } => {
                if target_uid == Some(caller_uid) {
                    Some(self_id.as_ref())
                } else {
                    Some(other_id.as_ref())
                }
            }
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlwaysAllowed => f.write_str("always-allowed"),
            Self::Plain { id } => f.write_str(id),
            Self::SelfOrOther { self_id, other_id } => write!(f, "{self_id}|{other_id}"),
        }
    }
}

pub const ALWAYS_ALLOWED: Action = Action::AlwaysAllowed;

/// Output capture and daemon stop.
pub const SERVICE_MANAGE: Action = Action::plain("org.pkgate.service.manage");

pub const POLICY_UPDATE: Action = Action::self_or_other(
    "org.pkgate.policy.update-self",
    "org.pkgate.policy.update-others",
);

pub const POLICY_DUMP: Action = Action::self_or_other(
    "org.pkgate.policy.dump-self",
    "org.pkgate.policy.dump-others",
);

static CATALOG: [(&str, Action); 4] = [
    ("always-allowed", ALWAYS_ALLOWED),
    ("service.manage", SERVICE_MANAGE),
    ("policy.update", POLICY_UPDATE),
    ("policy.dump", POLICY_DUMP),
];

/// Static catalog of the daemon's actions keyed by short name.
pub fn catalog() -> &'static [(&'static str, Action)] {
    &CATALOG
}

pub fn lookup(name: &str) -> Option<&'static Action> {
    let name = name.trim();
    CATALOG
        .iter()
        .find(|(entry, _)| *entry == name)
        .map(|(_, action)| action)
}
