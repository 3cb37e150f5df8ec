/*!
 * Audit trail for votes and account activity
 *
 * The voting service and the account routes hand every event to an `AuditLog`
 * which is injected through the application state rather than reached through
 * a global logger.
 */
use std::fmt;
use std::net::SocketAddr;
use std::sync::Mutex;

use log::*;

pub const UNKNOWN_ACTOR: &str = "unknown";

#[derive(Clone, Debug, PartialEq)]
pub enum AuditAction {
    Vote {
        /**
         * None when the request did not name a question by a numeric id
         */
        question_id: Option<i32>,
        choice_id: Option<i32>,
        outcome: String,
    },
    Login,
    LoginFailed,
    Logout,
}

impl AuditAction {
    pub fn name(&self) -> &'static str {
        match self {
            AuditAction::Vote { .. } => "vote",
            AuditAction::Login => "login",
            AuditAction::LoginFailed => "login_failed",
            AuditAction::Logout => "logout",
        }
    }

    fn is_failure(&self) -> bool {
        match self {
            AuditAction::Vote { outcome, .. } => outcome != "recorded" && outcome != "changed",
            AuditAction::LoginFailed => true,
            AuditAction::Login | AuditAction::Logout => false,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct AuditEvent {
    pub actor: String,
    pub action: AuditAction,
    pub client: String,
}

impl AuditEvent {
    pub fn new(actor: Option<&str>, action: AuditAction, client: &str) -> Self {
        Self {
            actor: actor.unwrap_or(UNKNOWN_ACTOR).to_string(),
            action,
            client: client.to_string(),
        }
    }
}

impl fmt::Display for AuditEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "actor={:?} action={} client={}",
            self.actor,
            self.action.name(),
            self.client
        )?;
        if let AuditAction::Vote {
            question_id,
            choice_id,
            outcome,
        } = &self.action
        {
            match question_id {
                Some(question_id) => write!(f, " question={}", question_id)?,
                None => write!(f, " question=none")?,
            }
            match choice_id {
                Some(choice_id) => write!(f, " choice={}", choice_id)?,
                None => write!(f, " choice=none")?,
            }
            write!(f, " outcome={}", outcome)?;
        }
        Ok(())
    }
}

pub trait AuditLog: Send + Sync {
    fn record(&self, event: &AuditEvent);
}

/**
 * Writes audit events through the `log` facade under the `polls::audit` target
 */
#[derive(Clone, Debug, Default)]
pub struct LogAudit;

impl AuditLog for LogAudit {
    fn record(&self, event: &AuditEvent) {
        if event.action.is_failure() {
            warn!(target: "polls::audit", "{}", event);
        } else {
            info!(target: "polls::audit", "{}", event);
        }
    }
}

/**
 * Keeps events in memory, handy for inspecting what was audited
 */
#[derive(Debug, Default)]
pub struct MemoryAudit {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAudit {
    pub fn events(&self) -> Vec<AuditEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl AuditLog for MemoryAudit {
    fn record(&self, event: &AuditEvent) {
        let mut events = match self.events.lock() {
            Ok(events) => events,
            Err(poisoned) => poisoned.into_inner(),
        };
        events.push(event.clone());
    }
}

/**
 * Work out where a request came from.
 *
 * The first entry of `X-Forwarded-For` wins when a proxy supplied one,
 * otherwise the peer address of the connection is used with its port dropped.
 */
pub fn client_addr(forwarded_for: Option<&str>, peer: Option<&str>) -> String {
    let forwarded = forwarded_for
        .and_then(|raw| raw.split(',').next())
        .map(str::trim)
        .filter(|first| !first.is_empty());

    if let Some(first) = forwarded {
        return first.to_string();
    }

    match peer {
        Some(peer) => match peer.parse::<SocketAddr>() {
            Ok(addr) => addr.ip().to_string(),
            Err(_) => peer.to_string(),
        },
        None => UNKNOWN_ACTOR.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forwarded_for_takes_precedence() {
        assert_eq!(
            client_addr(Some("203.0.113.9, 10.0.0.2"), Some("127.0.0.1:4000")),
            "203.0.113.9"
        );
    }

    #[test]
    fn peer_address_without_port() {
        assert_eq!(client_addr(None, Some("127.0.0.1:4000")), "127.0.0.1");
        assert_eq!(client_addr(Some("  "), Some("[::1]:4000")), "::1");
    }

    #[test]
    fn unparseable_peer_is_kept_verbatim() {
        assert_eq!(client_addr(None, Some("unix-socket")), "unix-socket");
        assert_eq!(client_addr(None, None), "unknown");
    }

    #[test]
    fn vote_events_format_as_key_values() {
        let event = AuditEvent::new(
            Some("alice"),
            AuditAction::Vote {
                question_id: Some(3),
                choice_id: None,
                outcome: "invalid_choice".to_string(),
            },
            "10.1.1.1",
        );
        assert_eq!(
            event.to_string(),
            "actor=\"alice\" action=vote client=10.1.1.1 question=3 choice=none outcome=invalid_choice"
        );
        assert!(event.action.is_failure());
    }

    #[test]
    fn anonymous_events_use_unknown_actor() {
        let event = AuditEvent::new(None, AuditAction::LoginFailed, "-");
        assert_eq!(event.actor, "unknown");

        let audit = MemoryAudit::default();
        audit.record(&event);
        assert_eq!(audit.events(), vec![event]);
    }
}
