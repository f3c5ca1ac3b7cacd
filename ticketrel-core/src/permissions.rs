//! Capability checks

use std::collections::{HashMap, HashSet};

use crate::error::{RelationError, Result};

pub const TICKET_VIEW: &str = "TICKET_VIEW";
pub const TICKET_MODIFY: &str = "TICKET_MODIFY";
/// Implies every other capability
pub const TICKET_ADMIN: &str = "TICKET_ADMIN";

pub const KNOWN_CAPABILITIES: [&str; 3] = [TICKET_VIEW, TICKET_MODIFY, TICKET_ADMIN];

/// Group every user belongs to
pub const ANONYMOUS: &str = "anonymous";
/// Group every named (non-anonymous) user belongs to
pub const AUTHENTICATED: &str = "authenticated";

/// Maps users and groups to the capabilities granted to them
#[derive(Debug, Clone)]
pub struct PermissionPolicy {
    grants: HashMap<String, HashSet<String>>,
}

impl PermissionPolicy {
    pub fn new(grants: &HashMap<String, Vec<String>>) -> Self {
        Self {
            grants: grants
                .iter()
                .map(|(subject, caps)| (subject.clone(), caps.iter().cloned().collect()))
                .collect(),
        }
    }

    /// Default grants: anonymous may view, authenticated users may also modify
    pub fn default_grants() -> HashMap<String, Vec<String>> {
        HashMap::from([
            (ANONYMOUS.to_string(), vec![TICKET_VIEW.to_string()]),
            (
                AUTHENTICATED.to_string(),
                vec![TICKET_VIEW.to_string(), TICKET_MODIFY.to_string()],
            ),
        ])
    }

    fn subjects<'a>(user: &'a str) -> Vec<&'a str> {
        if user.is_empty() || user == ANONYMOUS {
            vec![ANONYMOUS]
        } else {
            vec![user, AUTHENTICATED, ANONYMOUS]
        }
    }

    pub fn has(&self, user: &str, capability: &str) -> bool {
        Self::subjects(user).into_iter().any(|subject| {
            self.grants
                .get(subject)
                .is_some_and(|caps| caps.contains(capability) || caps.contains(TICKET_ADMIN))
        })
    }

    pub fn require(&self, user: &str, capability: &str) -> Result<()> {
        if self.has(user, capability) {
            Ok(())
        } else {
            log::debug!("User '{}' lacks {}", user, capability);
            Err(RelationError::Permission(format!(
                "{} privileges are required to perform this operation",
                capability
            )))
        }
    }
}

impl Default for PermissionPolicy {
    fn default() -> Self {
        Self::new(&Self::default_grants())
    }
}
