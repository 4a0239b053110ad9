//! Authorization gate for privileged daemon requests.
//!
//! Takes the peer pid/uid a transport attached to a request, pins the pid to a
//! live process lifetime through `/proc/<pid>/stat`, and asks the system
//! authority (PolicyKit) whether that process may perform an action.
pub mod action;
pub mod authority;
pub mod authorizer;
pub mod dbus_authority;
pub mod error;
pub mod proc_stat;
pub mod request;
pub mod settings;
pub mod user_lookup;

pub use action::Action;
pub use authority::{
    Authority, AuthorityError, AuthoritySubject, AuthorityVerdict, CheckFlags, SubjectDetails,
};
pub use authorizer::Authorizer;
pub use dbus_authority::DbusAuthority;
pub use error::{AuthorizationError, DenialKind};
pub use proc_stat::{
    parse_start_time, read_start_time, ProcStatError, ProcessIdentitySnapshot, StatParseError,
    StatRecord,
};
pub use request::{CheckRequest, PeerCredentials};
pub use settings::{load_authorizer_settings, AuthorizerConfig, AuthorizerSettings};
pub use user_lookup::{StaticUserLookup, SystemUserLookup, UserLookup, UserLookupError};
