//! System bus adapter for the PolicyKit authority.

use std::collections::HashMap;

use async_trait::async_trait;
use zbus::proxy::MethodFlags;
use zbus::zvariant::Value;
use zbus::{Connection, Proxy};

use crate::authority::{
    Authority, AuthorityError, AuthoritySubject, AuthorityVerdict, CheckFlags,
};

pub const POLKIT_BUS_NAME: &str = "org.freedesktop.PolicyKit1";
pub const POLKIT_AUTHORITY_PATH: &str = "/org/freedesktop/PolicyKit1/Authority";
pub const POLKIT_AUTHORITY_INTERFACE: &str = "org.freedesktop.PolicyKit1.Authority";

type SubjectWire<'a> = (&'a str, HashMap<&'a str, Value<'a>>);
type CheckAuthorizationReply = (bool, bool, HashMap<String, String>);

#[derive(Debug, Clone)]
/// `Authority` backed by `org.freedesktop.PolicyKit1` on a shared bus connection.
pub struct DbusAuthority {
    proxy: Proxy<'static>,
}

impl DbusAuthority {
    pub async fn connect_system() -> Result<Self, AuthorityError> {
        let connection = Connection::system().await?;
        Self::from_connection(&connection).await
    }

    pub async fn from_connection(connection: &Connection) -> Result<Self, AuthorityError> {
        let proxy = Proxy::new(
            connection,
            POLKIT_BUS_NAME,
            POLKIT_AUTHORITY_PATH,
            POLKIT_AUTHORITY_INTERFACE,
        )
        .await?;
        Ok(Self { proxy })
    }
}

fn subject_wire(subject: &AuthoritySubject) -> SubjectWire<'_> {
    let details = HashMap::from([
        ("pid", Value::from(subject.details.pid)),
        ("start-time", Value::from(subject.details.start_time)),
        ("uid", Value::from(subject.details.uid)),
    ]);
    (subject.kind, details)
}

/// Message header flag sent alongside the interactive bit of the `flags`
/// argument.
fn header_flag(flags: CheckFlags) -> Option<MethodFlags> {
    flags
        .allows_interaction()
        .then_some(MethodFlags::AllowInteractiveAuth)
}

#[async_trait]
impl Authority for DbusAuthority {
    async fn check_authorization(
        &self,
        subject: &AuthoritySubject,
        action_id: &str,
        flags: CheckFlags,
        cancellation_id: &str,
    ) -> Result<AuthorityVerdict, AuthorityError> {
        let details: HashMap<&str, &str> = HashMap::new();
        let body = (
            subject_wire(subject),
            action_id,
            details,
            flags.bits(),
            cancellation_id,
        );
        let reply: Option<CheckAuthorizationReply> = self
            .proxy
            .call_with_flags(
                "CheckAuthorization",
                header_flag(flags).map(Into::into).unwrap_or_default(),
                &body,
            )
            .await?;
        let (is_authorized, is_challenge, details) = reply.ok_or_else(|| {
            AuthorityError::Transport("CheckAuthorization returned no reply".to_string())
        })?;
        Ok(AuthorityVerdict {
            is_authorized,
            is_challenge,
            details: details.into_iter().collect(),
        })
    }

    async fn cancel_check_authorization(&self, cancellation_id: &str) -> Result<(), AuthorityError> {
        self.proxy
            .call_method("CancelCheckAuthorization", &(cancellation_id,))
            .await?;
        Ok(())
    }
}
