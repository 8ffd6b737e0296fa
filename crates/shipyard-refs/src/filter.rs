use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

// ---------------------------------------------------------------------------
// BranchPolicy
// ---------------------------------------------------------------------------

/// Allow and deny lists of branch names, loaded once at startup.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchPolicy {
    #[serde(default)]
    pub allowed: BTreeSet<String>,
    #[serde(default)]
    pub disallowed: BTreeSet<String>,
}

impl BranchPolicy {
    pub fn new<A, D, S>(allowed: A, disallowed: D) -> Self
    where
        A: IntoIterator<Item = S>,
        D: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed: allowed.into_iter().map(Into::into).collect(),
            disallowed: disallowed.into_iter().map(Into::into).collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// BranchFilter
// ---------------------------------------------------------------------------

/// Decides whether a target branch may be processed by this worker.
///
/// Rules, in order:
/// 1. a non-empty deny list containing the branch rejects it;
/// 2. a non-empty allow list not containing the branch rejects it;
/// 3. otherwise the branch is allowed.
///
/// With both lists empty every branch is allowed.
#[derive(Clone, Debug, Default)]
pub struct BranchFilter {
    policy: BranchPolicy,
}

impl BranchFilter {
    pub fn new(policy: BranchPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &BranchPolicy {
        &self.policy
    }

    pub fn is_allowed(&self, branch: &str) -> bool {
        if !self.policy.disallowed.is_empty() && self.policy.disallowed.contains(branch) {
            debug!(branch, "branch is on the deny list");
            return false;
        }
        if !self.policy.allowed.is_empty() && !self.policy.allowed.contains(branch) {
            debug!(branch, "branch is not on the allow list");
            return false;
        }
        true
    }
}
