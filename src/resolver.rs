//! Maps actions to the quota that applies to them.

use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;

use crate::counter::ActionId;
use crate::error::ThrottlerResult;
use crate::rate_limit_config::{QuotaPolicy, RateLimitConfig};

/// Resolves an [`ActionId`] to its [`QuotaPolicy`].
///
/// A rule declared for the action itself wins. Otherwise the group whose
/// prefix is the longest match for the action's path applies. Actions
/// matching neither are unthrottled. Answers for route actions are memoized;
/// the set of routes is fixed, so the memo stays bounded. Free-form action
/// ids go through [`PolicyResolver::resolve_uncached`] instead.
pub struct PolicyResolver {
    actions: HashMap<String, Arc<QuotaPolicy>>,
    /// Sorted by prefix length, longest first.
    groups: Vec<(String, Arc<QuotaPolicy>)>,
    resolved: DashMap<ActionId, Option<Arc<QuotaPolicy>>>,
}

impl PolicyResolver {
    pub fn new(config: RateLimitConfig) -> ThrottlerResult<Self> {
        config.validate()?;

        let actions = config
            .actions
            .into_iter()
            .map(|(action, rule)| -> ThrottlerResult<_> {
                Ok((action, Arc::new(QuotaPolicy::try_from(rule)?)))
            })
            .collect::<ThrottlerResult<HashMap<_, _>>>()?;

        let mut groups = config
            .groups
            .into_iter()
            .map(|(prefix, rule)| -> ThrottlerResult<_> {
                let prefix = prefix.trim_end_matches('/').to_string();
                Ok((prefix, Arc::new(QuotaPolicy::try_from(rule)?)))
            })
            .collect::<ThrottlerResult<Vec<_>>>()?;
        groups.sort_by(|(a, _), (b, _)| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

        Ok(Self {
            actions,
            groups,
            resolved: DashMap::new(),
        })
    }

    pub fn resolve(&self, action: &ActionId) -> Option<Arc<QuotaPolicy>> {
        if let Some(policy) = self.resolved.get(action) {
            return policy.clone();
        }

        let policy = self.resolve_uncached(action);
        self.resolved.insert(action.clone(), policy.clone());
        policy
    }

    /// Resolve without touching the memo, for action ids supplied by clients.
    pub fn resolve_uncached(&self, action: &ActionId) -> Option<Arc<QuotaPolicy>> {
        if let Some(policy) = self.actions.get(action.as_str()) {
            return Some(Arc::clone(policy));
        }

        let path = action.path();
        self.groups
            .iter()
            .find(|(prefix, _)| covers(prefix, path))
            .map(|(_, policy)| Arc::clone(policy))
    }

    /// Number of actions with a memoized answer.
    pub fn memoized(&self) -> usize {
        self.resolved.len()
    }

    /// Number of declared rules, actions and groups together.
    pub fn rule_count(&self) -> usize {
        self.actions.len() + self.groups.len()
    }
}

/// Whether a group prefix covers `path`, matching whole segments only.
fn covers(prefix: &str, path: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => prefix.is_empty() || rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}
