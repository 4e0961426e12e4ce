// Uniqueness registry - per-scope claims on slugs and unique field values

use crate::util::lock;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

/// Who claimed a value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claimant {
    pub collection: String,
    pub file: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Claim {
    Accepted,
    /// Already claimed in this scope; the earlier claimant keeps the value
    Duplicate(Claimant),
}

impl Claim {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Claim::Accepted)
    }
}

#[derive(Debug, Default)]
pub struct UniquenessRegistry {
    scopes: Mutex<HashMap<String, HashMap<String, Claimant>>>,
}

impl UniquenessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomic check-then-insert: the first claim of a value in a scope wins.
    pub fn claim(&self, scope: &str, value: &str, claimant: Claimant) -> Claim {
        let mut scopes = lock(&self.scopes);
        let values = scopes.entry(scope.to_string()).or_default();
        match values.get(value) {
            Some(existing) => Claim::Duplicate(existing.clone()),
            None => {
                values.insert(value.to_string(), claimant);
                Claim::Accepted
            }
        }
    }

    pub fn is_claimed(&self, scope: &str, value: &str) -> bool {
        self.claimant(scope, value).is_some()
    }

    pub fn claimant(&self, scope: &str, value: &str) -> Option<Claimant> {
        lock(&self.scopes)
            .get(scope)
            .and_then(|values| values.get(value))
            .cloned()
    }

    /// Release every value claimed by the given collection, in every scope.
    /// Returns the number of released values.
    pub fn release_collection(&self, collection: &str) -> usize {
        let mut scopes = lock(&self.scopes);
        let mut released = 0;
        for values in scopes.values_mut() {
            let before = values.len();
            values.retain(|_, claimant| claimant.collection != collection);
            released += before - values.len();
        }
        scopes.retain(|_, values| !values.is_empty());
        released
    }

    pub fn scope_len(&self, scope: &str) -> usize {
        lock(&self.scopes).get(scope).map(HashMap::len).unwrap_or(0)
    }

    pub fn clear(&self) {
        lock(&self.scopes).clear();
    }
}
