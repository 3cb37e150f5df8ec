/*!
 * Identity and session helpers
 *
 * Credentials are never stored by this service, an `IdentityProvider` answers
 * whether a username and password belong together. Once it does the username
 * is kept in the tide session.
 */
use std::collections::HashMap;

use async_trait::async_trait;
use log::*;
use tide::Request;

const SESSION_USER: &str = "user";
const SESSION_NOTICE: &str = "notice";

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /**
     * Returns the identity to attach to the session when the credentials are valid
     */
    async fn authenticate(&self, username: &str, password: &str) -> Option<String>;
}

/**
 * A fixed set of accounts, configured as `name:password` pairs separated by commas
 */
#[derive(Clone, Debug, Default)]
pub struct StaticIdentities {
    accounts: HashMap<String, String>,
}

impl StaticIdentities {
    pub fn parse(raw: &str) -> Self {
        let mut accounts = HashMap::new();
        for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            match entry.split_once(':') {
                Some((name, password)) if !name.trim().is_empty() => {
                    accounts.insert(name.trim().to_string(), password.to_string());
                }
                _ => warn!("Ignoring malformed account entry"),
            }
        }
        Self { accounts }
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentities {
    async fn authenticate(&self, username: &str, password: &str) -> Option<String> {
        let expected = self.accounts.get(username)?;
        if timing_safe_eq(expected, password) {
            Some(username.to_string())
        } else {
            None
        }
    }
}

/**
 * Constant time comparison for secrets of equal length
 */
pub fn timing_safe_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut out = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        out |= x ^ y;
    }
    out == 0
}

pub fn current_user<State>(req: &Request<State>) -> Option<String> {
    req.session().get::<String>(SESSION_USER)
}

pub fn log_in<State>(req: &mut Request<State>, user: &str) -> tide::Result<()> {
    let session = req.session_mut();
    session.regenerate();
    session.insert(SESSION_USER, user)?;
    Ok(())
}

pub fn log_out<State>(req: &mut Request<State>) {
    req.session_mut().destroy();
}

/**
 * Leave a message to show on the next page rendered for this session
 */
pub fn set_notice<State>(req: &mut Request<State>, notice: &str) -> tide::Result<()> {
    req.session_mut().insert(SESSION_NOTICE, notice)?;
    Ok(())
}

pub fn take_notice<State>(req: &mut Request<State>) -> Option<String> {
    let notice = req.session().get::<String>(SESSION_NOTICE);
    if notice.is_some() {
        req.session_mut().remove(SESSION_NOTICE);
    }
    notice
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accounts() {
        let ids = StaticIdentities::parse("alice:wonderland, bob:b:c ,broken,:nope,");
        assert_eq!(ids.len(), 2);
        assert_eq!(ids.accounts.get("bob").map(String::as_str), Some("b:c"));
        assert!(StaticIdentities::parse("").is_empty());
    }

    #[async_std::test]
    async fn authenticate_checks_password() {
        let ids = StaticIdentities::parse("alice:wonderland");
        assert_eq!(ids.authenticate("alice", "wonderland").await, Some("alice".to_string()));
        assert_eq!(ids.authenticate("alice", "wonderlanD").await, None);
        assert_eq!(ids.authenticate("mallory", "wonderland").await, None);
    }

    #[test]
    fn timing_safe_eq_lengths() {
        assert!(timing_safe_eq("secret", "secret"));
        assert!(!timing_safe_eq("secret", "secret!"));
        assert!(!timing_safe_eq("", "x"));
    }
}
