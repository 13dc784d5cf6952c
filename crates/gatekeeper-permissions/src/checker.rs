//! Policy evaluation against the cached bundle.
//!
//! The checker fails closed: if no bundle is available the caller gets an
//! error, never an allow.

use std::sync::Arc;

use gatekeeper_core::{BoxFuture, EntityData, HealthCheck};
use tracing::{debug, instrument};

use crate::bundle::{Attributes, Bundle};
use crate::cache::BundleCache;
use crate::error::PermissionsResult;

/// Decides whether a caller holds a permission.
pub trait PermissionsChecker: Send + Sync + 'static {
    /// Check `permission` for `entity`, given optional request attributes.
    ///
    /// An unknown permission is a deny, not an error.
    fn has_permission(
        &self,
        entity: &EntityData,
        permission: &str,
        attributes: Option<&Attributes>,
    ) -> PermissionsResult<bool>;

    /// The bundle decisions are currently made against.
    fn bundle(&self) -> PermissionsResult<Arc<Bundle>>;

    /// Health of the data behind decisions.
    fn health(&self) -> HealthCheck;

    /// Stop any background work. Safe to call more than once.
    fn close(&self) -> BoxFuture<'_, PermissionsResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

/// Evaluates permissions against a [`BundleCache`].
#[derive(Debug, Clone)]
pub struct Checker {
    cache: Arc<BundleCache>,
}

impl Checker {
    /// Create a checker reading from `cache`.
    pub fn new(cache: Arc<BundleCache>) -> Self {
        Self { cache }
    }

    /// The underlying cache.
    pub fn cache(&self) -> &Arc<BundleCache> {
        &self.cache
    }
}

impl PermissionsChecker for Checker {
    #[instrument(skip(self, entity, attributes), fields(caller = %entity.log_id()))]
    fn has_permission(
        &self,
        entity: &EntityData,
        permission: &str,
        attributes: Option<&Attributes>,
    ) -> PermissionsResult<bool> {
        let entity_keys = entity.entity_keys();
        let bundle = self.cache.read()?;

        let allowed = evaluate(&bundle, &entity_keys, permission, attributes);

        let outcome = if allowed { "allowed" } else { "denied" };
        metrics::counter!("gatekeeper_decisions_total", "outcome" => outcome).increment(1);
        debug!(outcome, "permission evaluated");

        Ok(allowed)
    }

    fn bundle(&self) -> PermissionsResult<Arc<Bundle>> {
        self.cache.read()
    }

    fn health(&self) -> HealthCheck {
        self.cache.health()
    }

    fn close(&self) -> BoxFuture<'_, PermissionsResult<()>> {
        Box::pin(self.cache.close())
    }
}

/// Check whether any policy for any of `entity_keys` grants `permission`.
pub fn evaluate(
    bundle: &Bundle,
    entity_keys: &[String],
    permission: &str,
    attributes: Option<&Attributes>,
) -> bool {
    let Some(entity_policies) = bundle.policies(permission) else {
        debug!("permission not present in bundle");
        return false;
    };

    entity_keys
        .iter()
        .filter_map(|key| entity_policies.get(key))
        .flatten()
        .any(|policy| {
            let applies = policy.applies(attributes);
            if applies {
                debug!(policy_id = %policy.id, "policy applies");
            }
            applies
        })
}
