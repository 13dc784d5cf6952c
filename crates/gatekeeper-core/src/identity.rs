//! Caller identity.
//!
//! [`EntityData`] is produced fresh for every request by the identity
//! resolver and consumed by the permissions checker. It is never cached.

use serde::{Deserialize, Serialize};

/// Prefix for user entity keys.
pub const USER_KEY_PREFIX: &str = "user/";

/// Prefix for service entity keys.
pub const SERVICE_KEY_PREFIX: &str = "service/";

/// Prefix for group entity keys.
pub const GROUP_KEY_PREFIX: &str = "group/";

/// The resolved identity of the caller.
///
/// # Example
///
/// ```rust
/// use gatekeeper_core::EntityData;
///
/// let entity = EntityData::user("alice").with_groups(["admin", "publisher"]);
/// assert_eq!(
///     entity.entity_keys(),
///     vec!["user/alice", "group/admin", "group/publisher"]
/// );
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityData {
    /// User identifier, when the caller is a person.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Service identifier, when the caller is another service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_id: Option<String>,
    /// Groups the caller belongs to.
    #[serde(default)]
    pub groups: Vec<String>,
}

impl EntityData {
    /// Entity data for a user with no groups.
    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Self::default()
        }
    }

    /// Entity data for a service with no groups.
    pub fn service(service_id: impl Into<String>) -> Self {
        Self {
            service_id: Some(service_id.into()),
            ..Self::default()
        }
    }

    /// Entity data carrying only group memberships.
    pub fn groups<I>(groups: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        Self::default().with_groups(groups)
    }

    /// Replaces the group memberships.
    pub fn with_groups<I>(mut self, groups: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.groups = groups.into_iter().map(Into::into).collect();
        self
    }

    /// Normalised lookup keys for this caller, in evaluation order.
    ///
    /// `user/<id>` first, then `service/<id>`, then one `group/<name>` per
    /// non-empty group. Empty identifiers are skipped.
    pub fn entity_keys(&self) -> Vec<String> {
        let mut keys = Vec::with_capacity(self.groups.len() + 2);

        if let Some(user_id) = self.user_id.as_deref().filter(|id| !id.is_empty()) {
            keys.push(format!("{USER_KEY_PREFIX}{user_id}"));
        }
        if let Some(service_id) = self.service_id.as_deref().filter(|id| !id.is_empty()) {
            keys.push(format!("{SERVICE_KEY_PREFIX}{service_id}"));
        }
        keys.extend(
            self.groups
                .iter()
                .filter(|g| !g.is_empty())
                .map(|g| format!("{GROUP_KEY_PREFIX}{g}")),
        );

        keys
    }

    /// A string identifier suitable for logging.
    pub fn log_id(&self) -> String {
        match (&self.user_id, &self.service_id) {
            (Some(user), _) => format!("user:{user}"),
            (None, Some(service)) => format!("service:{service}"),
            (None, None) => "anonymous".to_string(),
        }
    }
}
