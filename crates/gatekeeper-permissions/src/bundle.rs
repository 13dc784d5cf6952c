//! Permissions bundle model.
//!
//! A [`Bundle`] maps `permission → entity key → [Policy]`. Bundles are built
//! once (decoded from the permissions API or assembled in tests), then shared
//! behind an `Arc` and never mutated again; a refresh produces a new value.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{PermissionsError, PermissionsResult};

/// Contextual attributes supplied with a request, e.g. `collection_id`.
pub type Attributes = HashMap<String, String>;

/// Policies for one permission, keyed by entity key.
pub type EntityPolicies = HashMap<String, Vec<Policy>>;

/// An immutable snapshot of authorisation data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Bundle {
    permissions: HashMap<String, EntityPolicies>,
}

impl Bundle {
    /// Create an empty bundle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a bundle from the JSON body served by the permissions API.
    pub fn from_json(body: &[u8]) -> PermissionsResult<Self> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Err(PermissionsError::Decode("response body is empty".to_string()));
        }
        serde_json::from_slice(body).map_err(|e| PermissionsError::Decode(e.to_string()))
    }

    /// Add a policy granting `permission` to `entity_key`.
    pub fn with_policy(
        mut self,
        permission: impl Into<String>,
        entity_key: impl Into<String>,
        policy: Policy,
    ) -> Self {
        self.permissions
            .entry(permission.into())
            .or_default()
            .entry(entity_key.into())
            .or_default()
            .push(policy);
        self
    }

    /// Policies for a permission, if the permission is known.
    pub fn policies(&self, permission: &str) -> Option<&EntityPolicies> {
        self.permissions.get(permission)
    }

    /// Names of all permissions in the bundle.
    pub fn permission_names(&self) -> impl Iterator<Item = &str> {
        self.permissions.keys().map(String::as_str)
    }

    /// Number of permissions in the bundle.
    pub fn len(&self) -> usize {
        self.permissions.len()
    }

    /// Check if the bundle has no permissions.
    pub fn is_empty(&self) -> bool {
        self.permissions.is_empty()
    }
}

/// A named grant, optionally constrained by conditions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    /// Policy identifier.
    pub id: String,
    /// Conditions; at least one must hold unless the list is empty.
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl Policy {
    /// A policy with no conditions.
    pub fn unconditional(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            conditions: Vec::new(),
        }
    }

    /// Add a condition.
    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Check if this policy applies given the request attributes.
    pub fn applies(&self, attributes: Option<&Attributes>) -> bool {
        self.conditions.is_empty()
            || self
                .conditions
                .iter()
                .any(|condition| condition.is_satisfied(attributes))
    }
}

/// Comparison applied by a [`Condition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    /// Exact, case-sensitive string equality.
    StringEquals,
    /// Case-sensitive prefix match.
    StartsWith,
}

impl Operator {
    /// Compare a runtime attribute value against a condition value.
    pub fn matches(self, actual: &str, expected: &str) -> bool {
        match self {
            Self::StringEquals => actual == expected,
            Self::StartsWith => actual.starts_with(expected),
        }
    }
}

/// An attribute-based constraint on a policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    /// Name of the request attribute to inspect.
    pub attribute: String,
    /// Comparison to apply.
    pub operator: Operator,
    /// Accepted values; any one match satisfies the condition.
    #[serde(default)]
    pub values: Vec<String>,
}

impl Condition {
    /// Create a condition.
    pub fn new<I>(attribute: impl Into<String>, operator: Operator, values: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        Self {
            attribute: attribute.into(),
            operator,
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Check the condition against the request attributes.
    ///
    /// A missing attribute never satisfies a condition.
    pub fn is_satisfied(&self, attributes: Option<&Attributes>) -> bool {
        let Some(actual) = attributes.and_then(|attrs| attrs.get(&self.attribute)) else {
            return false;
        };
        self.values
            .iter()
            .any(|expected| self.operator.matches(actual, expected))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(pairs: &[(&str, &str)]) -> Attributes {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_decode_bundle() {
        let body = br#"{
            "users.add": {
                "group/admin": [ { "id": "policy1", "conditions": [] } ]
            },
            "legacy.read": {
                "group/viewer": [
                    { "id": "policy2",
                      "conditions": [
                        { "attribute": "collection_id", "operator": "StringEquals",
                          "values": ["collection765"] } ] } ]
            }
        }"#;

        let bundle = Bundle::from_json(body).unwrap();
        assert_eq!(bundle.len(), 2);

        let viewer = &bundle.policies("legacy.read").unwrap()["group/viewer"];
        assert_eq!(viewer[0].id, "policy2");
        assert_eq!(viewer[0].conditions[0].operator, Operator::StringEquals);
    }

    #[test]
    fn test_decode_missing_conditions() {
        let bundle =
            Bundle::from_json(br#"{"users.add": {"group/admin": [{"id": "p1"}]}}"#).unwrap();
        let policy = &bundle.policies("users.add").unwrap()["group/admin"][0];
        assert!(policy.conditions.is_empty());
    }

    #[test]
    fn test_decode_empty_body() {
        let err = Bundle::from_json(b"").unwrap_err();
        assert!(matches!(err, PermissionsError::Decode(_)));

        let err = Bundle::from_json(b"  \n").unwrap_err();
        assert!(matches!(err, PermissionsError::Decode(_)));
    }

    #[test]
    fn test_decode_invalid_json() {
        let err = Bundle::from_json(b"<html>bad gateway</html>").unwrap_err();
        assert!(matches!(err, PermissionsError::Decode(_)));
    }

    #[test]
    fn test_decode_unknown_operator() {
        let body = br#"{"p": {"group/a": [{"id": "x", "conditions": [
            {"attribute": "a", "operator": "Regex", "values": [".*"]}]}]}}"#;
        assert!(matches!(
            Bundle::from_json(body).unwrap_err(),
            PermissionsError::Decode(_)
        ));
    }

    #[test]
    fn test_unconditional_policy_applies() {
        let policy = Policy::unconditional("p1");
        assert!(policy.applies(None));
        assert!(policy.applies(Some(&Attributes::new())));
    }

    #[test]
    fn test_policy_any_condition_applies() {
        let policy = Policy::unconditional("p1")
            .with_condition(Condition::new("collection_id", Operator::StringEquals, ["c1"]))
            .with_condition(Condition::new("path", Operator::StartsWith, ["/files/"]));

        assert!(policy.applies(Some(&attrs(&[("path", "/files/a")]))));
        assert!(policy.applies(Some(&attrs(&[("collection_id", "c1")]))));
        assert!(!policy.applies(Some(&attrs(&[("collection_id", "c2")]))));
        assert!(!policy.applies(None));
    }

    #[test]
    fn test_starts_with() {
        let condition = Condition::new("path", Operator::StartsWith, ["/files/dir/a/"]);
        assert!(condition.is_satisfied(Some(&attrs(&[("path", "/files/dir/a/some/dir/")]))));
        assert!(!condition.is_satisfied(Some(&attrs(&[("path", "/files/dir/c/some/dir/")]))));
    }

    #[test]
    fn test_string_equals_case_sensitive() {
        let condition =
            Condition::new("collection_id", Operator::StringEquals, ["collection765"]);
        assert!(condition.is_satisfied(Some(&attrs(&[("collection_id", "collection765")]))));
        assert!(!condition.is_satisfied(Some(&attrs(&[("collection_id", "COLLECTION765")]))));
    }

    #[test]
    fn test_missing_attribute_not_satisfied() {
        let condition = Condition::new("collection_id", Operator::StringEquals, ["c1"]);
        assert!(!condition.is_satisfied(Some(&attrs(&[("other", "c1")]))));
    }

    #[test]
    fn test_condition_with_no_values_never_matches() {
        let condition = Condition::new("a", Operator::StartsWith, Vec::<String>::new());
        assert!(!condition.is_satisfied(Some(&attrs(&[("a", "")]))));
    }
}
