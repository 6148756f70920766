//! Per-request cancellation tokens with parent → child cascade.
//!
//! Each `request_id` owns a group token; every dispatcher serving that
//! request gets a child of it.  A request created from a child context
//! hangs its group under the parent's group, so cancelling the parent
//! request cancels all of its children too.  Several dispatchers may share
//! one `request_id`; the group lives until the last of them is removed.

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

struct RequestGroup {
    token: CancellationToken,
    live: usize,
}

#[derive(Default)]
pub struct CancelRegistry {
    groups: Mutex<HashMap<String, RequestGroup>>,
}

impl CancelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one dispatcher for `request_id` and return its token.
    ///
    /// The first registration for a request creates the group, as a child
    /// of `parent_request_id`'s group when that one is still registered.
    /// A group that was already cancelled hands out cancelled tokens.
    pub fn register(&self, request_id: &str, parent_request_id: Option<&str>) -> CancellationToken {
        let mut groups = self.groups.lock();
        if let Some(group) = groups.get_mut(request_id) {
            group.live += 1;
            return group.token.child_token();
        }

        let token = match parent_request_id.and_then(|p| groups.get(p)) {
            Some(parent) => parent.token.child_token(),
            None => CancellationToken::new(),
        };
        let dispatcher_token = token.child_token();
        groups.insert(request_id.to_owned(), RequestGroup { token, live: 1 });
        dispatcher_token
    }

    /// Cancel every dispatcher of a request and of its child requests.
    /// Returns true if the request was registered.
    pub fn cancel(&self, request_id: &str) -> bool {
        match self.groups.lock().get(request_id) {
            Some(group) => {
                group.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Drop one dispatcher's registration; the group goes with the last one.
    pub fn remove(&self, request_id: &str) {
        let mut groups = self.groups.lock();
        if let Some(group) = groups.get_mut(request_id) {
            group.live = group.live.saturating_sub(1);
            if group.live == 0 {
                groups.remove(request_id);
            }
        }
    }

    pub fn is_registered(&self, request_id: &str) -> bool {
        self.groups.lock().contains_key(request_id)
    }

    /// Dispatchers currently registered under `request_id`.
    pub fn live_for(&self, request_id: &str) -> usize {
        self.groups.lock().get(request_id).map_or(0, |g| g.live)
    }

    /// Number of registered requests.
    pub fn len(&self) -> usize {
        self.groups.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_cancel() {
        let reg = CancelRegistry::new();
        let token = reg.register("r1", None);
        assert!(!token.is_cancelled());
        assert!(reg.is_registered("r1"));

        assert!(reg.cancel("r1"));
        assert!(token.is_cancelled());

        reg.remove("r1");
        assert!(!reg.is_registered("r1"));
        assert!(!reg.cancel("r1"));
    }

    #[test]
    fn cancel_cascades_to_children() {
        let reg = CancelRegistry::new();
        let parent = reg.register("parent", None);
        let child = reg.register("child", Some("parent"));
        let grandchild = reg.register("grandchild", Some("child"));

        reg.cancel("parent");
        assert!(parent.is_cancelled());
        assert!(child.is_cancelled());
        assert!(grandchild.is_cancelled());
    }

    #[test]
    fn cancelling_child_leaves_parent_running() {
        let reg = CancelRegistry::new();
        let parent = reg.register("parent", None);
        let child = reg.register("child", Some("parent"));

        reg.cancel("child");
        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());
    }

    #[test]
    fn unknown_parent_gives_independent_token() {
        let reg = CancelRegistry::new();
        let token = reg.register("orphan", Some("finished-parent"));
        assert!(!token.is_cancelled());
        assert!(!reg.cancel("finished-parent"));
        assert!(!token.is_cancelled());
    }

    #[test]
    fn shared_request_survives_one_removal() {
        let reg = CancelRegistry::new();
        let first = reg.register("r1", None);
        let second = reg.register("r1", None);
        assert_eq!(reg.live_for("r1"), 2);

        reg.remove("r1");
        assert!(reg.is_registered("r1"));
        assert!(reg.cancel("r1"));
        assert!(first.is_cancelled());
        assert!(second.is_cancelled());

        reg.remove("r1");
        assert!(!reg.is_registered("r1"));
    }

    #[test]
    fn cancelling_one_dispatcher_token_spares_its_siblings() {
        let reg = CancelRegistry::new();
        let first = reg.register("r1", None);
        let second = reg.register("r1", None);
        let child = reg.register("r2", Some("r1"));

        first.cancel();
        assert!(!second.is_cancelled());
        assert!(!child.is_cancelled());
    }

    #[test]
    fn remove_is_idempotent() {
        let reg = CancelRegistry::new();
        reg.register("r1", None);
        reg.remove("r1");
        reg.remove("r1");
        assert!(reg.is_empty());
    }
}
