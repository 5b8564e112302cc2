//! Approval cache for shell-command permissions.
//!
//! Keyed by `(conversation_id, command_signature)`. A `remember=true`
//! entry survives for the conversation's lifetime; a `remember=false`
//! entry is consumed by the first `is_approved` read. The map is guarded
//! by a single coarse mutex; contention is low because approvals are
//! human-paced.

use std::collections::HashMap;
use std::sync::Mutex;

use tracing::debug;

/// Session-scoped and one-shot approval storage.
///
/// Process-scoped lifetime with explicit teardown: call
/// [`ApprovalCache::clear_conversation`] when a conversation is deleted and
/// [`ApprovalCache::clear_all`] on shutdown/restart.
pub struct ApprovalCache {
    entries: Mutex<HashMap<(String, String), bool>>,
}

impl ApprovalCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Record an approval for a command signature.
    ///
    /// `remember=true` keeps the approval until the conversation is
    /// cleared; `remember=false` grants exactly one subsequent execution.
    pub fn approve(&self, conversation_id: &str, signature: &str, remember: bool) {
        debug!(
            conversation_id = %conversation_id,
            signature = %signature,
            remember,
            "Recording command approval"
        );
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(
            (conversation_id.to_string(), signature.to_string()),
            remember,
        );
    }

    /// Check for an approval, consuming one-shot entries.
    ///
    /// Returns `true` on a hit. A `remember=false` hit deletes the entry as
    /// a side effect of the read, so it is usable at most once.
    pub fn is_approved(&self, conversation_id: &str, signature: &str) -> bool {
        let key = (conversation_id.to_string(), signature.to_string());
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        match entries.get(&key) {
            Some(true) => true,
            Some(false) => {
                entries.remove(&key);
                true
            }
            None => false,
        }
    }

    /// Drop all approvals for one conversation.
    pub fn clear_conversation(&self, conversation_id: &str) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.retain(|(conv, _), _| conv != conversation_id);
    }

    /// Drop all approvals.
    pub fn clear_all(&self) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.clear();
    }

    /// Number of cached approvals.
    pub fn len(&self) -> usize {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ApprovalCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_miss_by_default() {
        let cache = ApprovalCache::new();
        assert!(!cache.is_approved("conv-1", "git push"));
    }

    #[test]
    fn test_remembered_approval_persists() {
        let cache = ApprovalCache::new();
        cache.approve("conv-1", "git push", true);

        assert!(cache.is_approved("conv-1", "git push"));
        assert!(cache.is_approved("conv-1", "git push"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_one_shot_approval_consumed_on_read() {
        let cache = ApprovalCache::new();
        cache.approve("conv-1", "npm install", false);

        assert!(cache.is_approved("conv-1", "npm install"));
        assert!(!cache.is_approved("conv-1", "npm install"));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_conversations_are_isolated() {
        let cache = ApprovalCache::new();
        cache.approve("conv-1", "git push", true);

        assert!(!cache.is_approved("conv-2", "git push"));
        assert!(cache.is_approved("conv-1", "git push"));
    }

    #[test]
    fn test_clear_conversation() {
        let cache = ApprovalCache::new();
        cache.approve("conv-1", "git push", true);
        cache.approve("conv-1", "cargo build", true);
        cache.approve("conv-2", "git push", true);

        cache.clear_conversation("conv-1");

        assert!(!cache.is_approved("conv-1", "git push"));
        assert!(!cache.is_approved("conv-1", "cargo build"));
        assert!(cache.is_approved("conv-2", "git push"));
    }

    #[test]
    fn test_clear_all() {
        let cache = ApprovalCache::new();
        cache.approve("conv-1", "a", true);
        cache.approve("conv-2", "b", false);

        cache.clear_all();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_reapprove_upgrades_to_remembered() {
        let cache = ApprovalCache::new();
        cache.approve("conv-1", "git push", false);
        cache.approve("conv-1", "git push", true);

        assert!(cache.is_approved("conv-1", "git push"));
        assert!(cache.is_approved("conv-1", "git push"));
    }
}
