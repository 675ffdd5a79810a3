use std::fmt::Write;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::error::StoreError;
use super::index::BotIndex;
use crate::config::{API_KEY_BYTES, API_KEY_PREFIX};
use crate::models::{Bot, BotStatus, User};

/// Borrowed view of the collections, in the on-disk layout.
#[derive(Serialize)]
pub(crate) struct RecordsRef<'a> {
    users: &'a [User],
    bots: &'a [Bot],
}

/// Owned on-disk layout. `null` collections load as empty.
#[derive(Deserialize)]
pub(crate) struct Records {
    #[serde(default)]
    users: Option<Vec<User>>,
    #[serde(default)]
    bots: Option<Vec<Bot>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub total_users: usize,
    pub total_bots: usize,
    pub total_coins: i64,
    pub total_fish: i64,
}

/// Users and bots in insertion order, plus the bot name index.
///
/// Only reachable through [`Store`](super::Store), which holds it behind the
/// store guard. Structural bot changes go through [`Dataset::insert_bot`] and
/// [`Dataset::remove_bot`] so the index never drifts from the collection.
#[derive(Debug, Default)]
pub struct Dataset {
    users: Vec<User>,
    bots: Vec<Bot>,
    index: BotIndex,
    /// Bumped by every method that changes a record.
    generation: u64,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds the index over loaded records. Errors with the first duplicated bot id.
    pub(crate) fn from_records(records: Records) -> Result<Self, i64> {
        let users = records.users.unwrap_or_default();
        let bots = records.bots.unwrap_or_default();
        let index = BotIndex::build(&bots)?;
        Ok(Dataset {
            users,
            bots,
            index,
            generation: 0,
        })
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn records(&self) -> RecordsRef<'_> {
        RecordsRef {
            users: &self.users,
            bots: &self.bots,
        }
    }

    pub fn users(&self) -> &[User] {
        &self.users
    }

    pub fn bots(&self) -> &[Bot] {
        &self.bots
    }

    #[cfg(test)]
    pub fn user(&self, id: i64) -> Option<&User> {
        self.users.iter().find(|u| u.id == id)
    }

    pub fn user_by_username(&self, username: &str) -> Option<&User> {
        self.users.iter().find(|u| u.username == username)
    }

    /// Returns the user only when both username and password match.
    pub fn authenticate(&self, username: &str, password: &str) -> Option<&User> {
        self.users
            .iter()
            .find(|u| u.username == username && u.password == password)
    }

    /// Appends a user, rejecting usernames already taken by anyone in the collection.
    pub fn insert_user(&mut self, user: User) -> Result<&User, StoreError> {
        if self.user_by_username(&user.username).is_some() {
            return Err(StoreError::DuplicateUsername(user.username));
        }
        self.users.push(user);
        self.generation += 1;
        Ok(&self.users[self.users.len() - 1])
    }

    /// Creates a user with a fresh id and API key.
    pub fn register_user(
        &mut self,
        username: String,
        password: String,
        now: DateTime<Utc>,
    ) -> Result<&User, StoreError> {
        let user = User {
            id: next_id(now, self.users.iter().map(|u| u.id)),
            username,
            password,
            api_key: generate_api_key(),
            created_at: now,
        };
        self.insert_user(user)
    }

    /// `Ok(None)` when no user has `id`.
    pub fn rename_user(&mut self, id: i64, username: String) -> Result<Option<&User>, StoreError> {
        if self
            .user_by_username(&username)
            .is_some_and(|other| other.id != id)
        {
            return Err(StoreError::DuplicateUsername(username));
        }
        let Some(user) = self.users.iter_mut().find(|u| u.id == id) else {
            return Ok(None);
        };
        user.username = username;
        self.generation += 1;
        Ok(Some(user))
    }

    /// Replaces the user's API key and returns the new one.
    pub fn rotate_api_key(&mut self, id: i64) -> Option<&str> {
        let user = self.users.iter_mut().find(|u| u.id == id)?;
        user.api_key = generate_api_key();
        self.generation += 1;
        Some(user.api_key.as_str())
    }

    pub fn next_bot_id(&self, now: DateTime<Utc>) -> i64 {
        next_id(now, self.bots.iter().map(|b| b.id))
    }

    /// Appends a bot and indexes it by name.
    pub fn insert_bot(&mut self, bot: Bot) -> &Bot {
        let position = self.bots.len();
        self.index.insert(&bot, position);
        self.bots.push(bot);
        self.generation += 1;
        &self.bots[position]
    }

    /// Removes the bot with `id` from both the index and the collection.
    pub fn remove_bot(&mut self, id: i64) -> Option<Bot> {
        let position = self.index.position_of(id)?;
        let removed = self.bots.remove(position);
        self.index.remove(&removed, position, &self.bots);
        self.generation += 1;
        Some(removed)
    }

    #[cfg(test)]
    pub fn bot_by_name(&self, name: &str) -> Option<&Bot> {
        self.index.lookup(name).map(|position| &self.bots[position])
    }

    /// Handing out a mutable bot counts as a change.
    pub fn bot_by_name_mut(&mut self, name: &str) -> Option<&mut Bot> {
        let position = self.index.lookup(name)?;
        self.generation += 1;
        Some(&mut self.bots[position])
    }

    pub fn bots_for_user(&self, user_id: i64) -> impl Iterator<Item = &Bot> {
        self.bots.iter().filter(move |b| b.user_id == user_id)
    }

    pub fn stats(&self) -> Stats {
        Stats {
            total_users: self.users.len(),
            total_bots: self.bots.len(),
            total_coins: self.bots.iter().map(|b| b.coin).sum(),
            total_fish: self.bots.iter().map(|b| b.fish_caught).sum(),
        }
    }

    /// Marks online bots whose last update is older than `timeout` as offline.
    ///
    /// Returns the names of the bots that were demoted. Bots that never
    /// reported stay untouched.
    pub fn demote_stale(&mut self, now: DateTime<Utc>, timeout: Duration) -> Vec<String> {
        let mut demoted = Vec::new();
        for bot in &mut self.bots {
            let stale = bot.last_update.is_some_and(|last| now - last > timeout);
            if bot.is_online() && stale {
                bot.status = BotStatus::Offline;
                demoted.push(bot.name.clone());
            }
        }
        if !demoted.is_empty() {
            self.generation += 1;
        }
        demoted
    }
}

/// Millisecond timestamp ids, bumped past the current maximum so they stay unique.
fn next_id(now: DateTime<Utc>, existing: impl Iterator<Item = i64>) -> i64 {
    let floor = existing.max().map_or(i64::MIN, |max| max.saturating_add(1));
    now.timestamp_millis().max(floor)
}

/// `ts_` followed by 16 random bytes in lowercase hex.
pub fn generate_api_key() -> String {
    let bytes: [u8; API_KEY_BYTES] = rand::random();
    bytes
        .iter()
        .fold(String::from(API_KEY_PREFIX), |mut key, byte| {
            let _ = write!(key, "{byte:02x}");
            key
        })
}
