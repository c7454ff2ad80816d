//! In-memory roster and the conversation relation table
//!
//! [`ActiveUserList`] is a cheap-to-clone handle: give one clone to the hub
//! as its [`Roster`] and keep another for display. Conversations are linked
//! to users through [`ConversationLinks`], which the conversation side owns;
//! roster entries never point at a conversation themselves.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use uuid::Uuid;

use crate::handler::Roster;

/// Usernames compare by their Unicode lowercase form everywhere
fn fold(name: &str) -> String {
    name.to_lowercase()
}

/// Another user in the chat circle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveUser {
    username: String,
}

impl ActiveUser {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Same user as `name`, ignoring case
    pub fn is_named(&self, name: &str) -> bool {
        fold(&self.username) == fold(name)
    }

    /// Case-insensitive ordering by username
    pub fn compare(&self, other: &Self) -> Ordering {
        fold(&self.username)
            .cmp(&fold(&other.username))
            .then_with(|| self.username.cmp(&other.username))
    }
}

/// Sorted list of active users, shared between the hub and the UI
#[derive(Debug, Clone, Default)]
pub struct ActiveUserList {
    users: Arc<RwLock<Vec<ActiveUser>>>,
}

impl ActiveUserList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Find a user, ignoring case
    pub fn active_user_named(&self, username: &str) -> Option<ActiveUser> {
        self.users
            .read()
            .iter()
            .find(|user| user.is_named(username))
            .cloned()
    }

    pub fn usernames(&self) -> Vec<String> {
        self.users
            .read()
            .iter()
            .map(|user| user.username.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.users.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.read().is_empty()
    }
}

impl Roster for ActiveUserList {
    fn add_user(&mut self, name: &str) {
        let mut users = self.users.write();
        if users.iter().any(|u| u.is_named(name)) {
            return;
        }
        let user = ActiveUser::new(name);
        let at = users
            .binary_search_by(|entry| entry.compare(&user))
            .unwrap_or_else(|i| i);
        users.insert(at, user);
    }

    fn remove_user(&mut self, name: &str) {
        self.users
            .write()
            .retain(|u| !u.is_named(name));
    }

    fn filter_users(&mut self, keep: &HashSet<String>) {
        let keep: HashSet<String> = keep.iter().map(|name| fold(name)).collect();
        self.users.write().retain(|u| keep.contains(&fold(&u.username)));
    }
}

/// Identifies one private conversation window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConversationId(Uuid);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

/// Which conversation, if any, is open with each user
#[derive(Debug, Default)]
pub struct ConversationLinks {
    by_user: HashMap<String, ConversationId>,
}

impl ConversationLinks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Conversation with `username`, opening one if none exists
    pub fn open(&mut self, username: &str) -> ConversationId {
        *self
            .by_user
            .entry(fold(username))
            .or_insert_with(ConversationId::new)
    }

    pub fn conversation_for(&self, username: &str) -> Option<ConversationId> {
        self.by_user.get(&fold(username)).copied()
    }

    pub fn close(&mut self, id: ConversationId) {
        self.by_user.retain(|_, linked| *linked != id);
    }

    /// Release links to users who have left the roster
    pub fn retain_users(&mut self, roster: &ActiveUserList) {
        self.by_user
            .retain(|user, _| roster.active_user_named(user).is_some());
    }

    pub fn len(&self) -> usize {
        self.by_user.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_user.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roster_of(names: &[&str]) -> ActiveUserList {
        let mut roster = ActiveUserList::new();
        for name in names {
            roster.add_user(name);
        }
        roster
    }

    // ==================== ActiveUserList Tests ====================

    #[test]
    fn test_users_sorted_case_insensitively() {
        let roster = roster_of(&["carol", "Bob", "alice"]);
        assert_eq!(roster.usernames(), ["alice", "Bob", "carol"]);
    }

    #[test]
    fn test_add_user_ignores_duplicates() {
        let roster = roster_of(&["alice", "ALICE"]);
        assert_eq!(roster.len(), 1);
    }

    #[test]
    fn test_non_ascii_names_fold_the_same_everywhere() {
        let mut roster = roster_of(&["Élise", "élise"]);
        assert_eq!(roster.usernames(), ["Élise"]);
        assert!(roster.active_user_named("ÉLISE").is_some());

        let keep: HashSet<String> = ["élise".to_string()].into_iter().collect();
        roster.filter_users(&keep);
        assert_eq!(roster.usernames(), ["Élise"]);

        let mut links = ConversationLinks::new();
        let id = links.open("élise");
        assert_eq!(links.conversation_for("Élise"), Some(id));
        links.retain_users(&roster);
        assert_eq!(links.len(), 1);

        roster.remove_user("ÉLISE");
        assert!(roster.is_empty());
    }

    #[test]
    fn test_active_user_named_ignores_case() {
        let roster = roster_of(&["Alice"]);
        assert_eq!(roster.active_user_named("alice").unwrap().username(), "Alice");
        assert!(roster.active_user_named("bob").is_none());
    }

    #[test]
    fn test_remove_user() {
        let mut roster = roster_of(&["alice", "bob"]);
        roster.remove_user("Bob");
        assert_eq!(roster.usernames(), ["alice"]);
    }

    #[test]
    fn test_filter_users() {
        let mut roster = roster_of(&["alice", "bob", "carol"]);
        let keep: HashSet<String> = ["Carol".to_string(), "alice".to_string()].into();
        roster.filter_users(&keep);
        assert_eq!(roster.usernames(), ["alice", "carol"]);
    }

    #[test]
    fn test_clones_share_state() {
        let roster = ActiveUserList::new();
        let mut hub_side = roster.clone();
        hub_side.add_user("dave");
        assert!(!roster.is_empty());
    }

    // ==================== ConversationLinks Tests ====================

    #[test]
    fn test_open_reuses_existing_conversation() {
        let mut links = ConversationLinks::new();
        let first = links.open("bob");
        let second = links.open("BOB");
        assert_eq!(first, second);
        assert_eq!(links.len(), 1);
    }

    #[test]
    fn test_close_conversation() {
        let mut links = ConversationLinks::new();
        let id = links.open("bob");
        links.close(id);
        assert!(links.conversation_for("bob").is_none());
        assert!(links.is_empty());
    }

    #[test]
    fn test_retain_users_drops_departed() {
        let mut roster = roster_of(&["alice", "bob"]);
        let mut links = ConversationLinks::new();
        links.open("alice");
        links.open("bob");

        roster.remove_user("bob");
        links.retain_users(&roster);

        assert!(links.conversation_for("alice").is_some());
        assert!(links.conversation_for("bob").is_none());
    }
}
