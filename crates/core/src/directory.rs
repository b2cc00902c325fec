use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub is_channel: bool,
    #[serde(default)]
    pub is_private: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub real_name: Option<String>,
    #[serde(default)]
    pub is_bot: bool,
}

/// The bot's own identity as reported by `auth.test`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub bot_id: Option<String>,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("{kind} `{key}` is not in the directory")]
    NotFound { kind: &'static str, key: String },
}

#[derive(Debug, Default)]
struct Snapshot {
    identity: Identity,
    channels_by_id: HashMap<String, Channel>,
    channel_ids_by_name: HashMap<String, String>,
    users_by_id: HashMap<String, User>,
    user_ids_by_name: HashMap<String, String>,
}

impl Snapshot {
    fn insert_channel(&mut self, channel: Channel) {
        if let Some(previous) = self.channels_by_id.get(&channel.id) {
            if previous.name != channel.name {
                self.channel_ids_by_name.remove(&previous.name);
            }
        }
        if !channel.name.is_empty() {
            self.channel_ids_by_name.insert(channel.name.clone(), channel.id.clone());
        }
        self.channels_by_id.insert(channel.id.clone(), channel);
    }

    fn insert_user(&mut self, user: User) {
        if let Some(previous) = self.users_by_id.get(&user.id) {
            if previous.name != user.name {
                self.user_ids_by_name.remove(&previous.name);
            }
        }
        if !user.name.is_empty() {
            self.user_ids_by_name.insert(user.name.clone(), user.id.clone());
        }
        self.users_by_id.insert(user.id.clone(), user);
    }
}

/// Channel and user identity data shared by the classifier and every plugin helper.
///
/// Readers never block each other; writes happen only on directory refresh and on
/// membership or metadata events.
#[derive(Debug, Default)]
pub struct DirectoryCache {
    inner: RwLock<Snapshot>,
}

impl DirectoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Snapshot> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Snapshot> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_identity(&self, identity: Identity) {
        self.write().identity = identity;
    }

    pub fn identity(&self) -> Identity {
        self.read().identity.clone()
    }

    pub fn bot_user_id(&self) -> String {
        self.read().identity.user_id.clone()
    }

    /// True when `user_id` or `bot_id` belongs to this bot.
    pub fn is_self(&self, user_id: Option<&str>, bot_id: Option<&str>) -> bool {
        let snapshot = self.read();
        let identity = &snapshot.identity;
        let by_user =
            user_id.is_some_and(|id| !identity.user_id.is_empty() && id == identity.user_id);
        let by_bot = match (bot_id, identity.bot_id.as_deref()) {
            (Some(incoming), Some(own)) => incoming == own,
            _ => false,
        };
        by_user || by_bot
    }

    /// Replaces the whole snapshot, keeping the current identity.
    pub fn replace_all(&self, channels: Vec<Channel>, users: Vec<User>) {
        let mut fresh = Snapshot::default();
        for channel in channels {
            fresh.insert_channel(channel);
        }
        for user in users {
            fresh.insert_user(user);
        }

        let mut snapshot = self.write();
        fresh.identity = std::mem::take(&mut snapshot.identity);
        *snapshot = fresh;
    }

    pub fn upsert_channel(&self, channel: Channel) {
        self.write().insert_channel(channel);
    }

    pub fn upsert_user(&self, user: User) {
        self.write().insert_user(user);
    }

    pub fn channel(&self, id: &str) -> Result<Channel, DirectoryError> {
        self.read()
            .channels_by_id
            .get(id)
            .cloned()
            .ok_or_else(|| DirectoryError::NotFound { kind: "channel", key: id.to_owned() })
    }

    pub fn channel_by_name(&self, name: &str) -> Result<Channel, DirectoryError> {
        let name = name.trim_start_matches('#');
        let snapshot = self.read();
        snapshot
            .channel_ids_by_name
            .get(name)
            .and_then(|id| snapshot.channels_by_id.get(id))
            .cloned()
            .ok_or_else(|| DirectoryError::NotFound { kind: "channel", key: name.to_owned() })
    }

    pub fn channel_id(&self, name: &str) -> Result<String, DirectoryError> {
        self.channel_by_name(name).map(|channel| channel.id)
    }

    pub fn user(&self, id: &str) -> Result<User, DirectoryError> {
        self.read()
            .users_by_id
            .get(id)
            .cloned()
            .ok_or_else(|| DirectoryError::NotFound { kind: "user", key: id.to_owned() })
    }

    pub fn user_by_name(&self, name: &str) -> Result<User, DirectoryError> {
        let name = name.trim_start_matches('@');
        let snapshot = self.read();
        snapshot
            .user_ids_by_name
            .get(name)
            .and_then(|id| snapshot.users_by_id.get(id))
            .cloned()
            .ok_or_else(|| DirectoryError::NotFound { kind: "user", key: name.to_owned() })
    }

    pub fn user_name(&self, id: &str) -> Result<String, DirectoryError> {
        self.user(id).map(|user| user.name)
    }

    pub fn counts(&self) -> (usize, usize) {
        let snapshot = self.read();
        (snapshot.channels_by_id.len(), snapshot.users_by_id.len())
    }
}

#[cfg(test)]
mod tests {
    use super::{Channel, DirectoryCache, DirectoryError, Identity, User};

    fn channel(id: &str, name: &str) -> Channel {
        Channel { id: id.to_owned(), name: name.to_owned(), is_channel: true, is_private: false }
    }

    fn user(id: &str, name: &str) -> User {
        User { id: id.to_owned(), name: name.to_owned(), ..User::default() }
    }

    #[test]
    fn lookups_work_in_both_directions() {
        let directory = DirectoryCache::new();
        directory.replace_all(vec![channel("C1", "general")], vec![user("U1", "jirwin")]);

        assert_eq!(directory.channel_id("#general"), Ok("C1".to_owned()));
        assert_eq!(directory.channel("C1").map(|c| c.name), Ok("general".to_owned()));
        assert_eq!(directory.user_name("U1"), Ok("jirwin".to_owned()));
        assert_eq!(directory.user_by_name("@jirwin").map(|u| u.id), Ok("U1".to_owned()));
    }

    #[test]
    fn channel_rename_drops_stale_name() {
        let directory = DirectoryCache::new();
        directory.upsert_channel(channel("C1", "random"));
        directory.upsert_channel(channel("C1", "off-topic"));

        assert!(matches!(
            directory.channel_by_name("random"),
            Err(DirectoryError::NotFound { .. })
        ));
        assert_eq!(directory.channel_id("off-topic"), Ok("C1".to_owned()));
        assert_eq!(directory.counts(), (1, 0));
    }

    #[test]
    fn replace_all_keeps_identity() {
        let directory = DirectoryCache::new();
        directory.set_identity(Identity { user_id: "UBOT".to_owned(), bot_id: Some("B1".into()) });
        directory.upsert_user(user("U9", "gone"));
        directory.replace_all(Vec::new(), vec![user("U1", "jirwin")]);

        assert_eq!(directory.bot_user_id(), "UBOT");
        assert!(directory.user("U9").is_err());
        assert!(directory.is_self(Some("UBOT"), None));
        assert!(directory.is_self(None, Some("B1")));
        assert!(!directory.is_self(Some("U1"), None));
    }

    #[test]
    fn empty_identity_never_matches() {
        let directory = DirectoryCache::new();
        assert!(!directory.is_self(Some(""), None));
        assert!(!directory.is_self(None, None));
    }
}
