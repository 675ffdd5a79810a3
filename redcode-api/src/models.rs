use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{DEFAULT_BACKPACK_MAX, NO_FISH};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub username: String,
    /// Persisted to the database file but never returned to clients.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub password: String,
    pub api_key: String,
    pub created_at: DateTime<Utc>,
}

/// Client-facing view of a [`User`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: i64,
    pub username: String,
    pub api_key: String,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for PublicUser {
    fn from(user: &User) -> Self {
        PublicUser {
            id: user.id,
            username: user.username.clone(),
            api_key: user.api_key.clone(),
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BotStatus {
    Online,
    #[default]
    Offline,
}

/// Fish rarity, ordered from most to least common.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Rarity {
    #[default]
    Common,
    Uncommon,
    Rare,
    Epic,
    Legendary,
    Mythic,
    Secret,
}

impl Rarity {
    pub const ALL: [Rarity; 7] = [
        Rarity::Common,
        Rarity::Uncommon,
        Rarity::Rare,
        Rarity::Epic,
        Rarity::Legendary,
        Rarity::Mythic,
        Rarity::Secret,
    ];

    /// Maps the game's 1-based item tier onto a rarity.
    pub fn from_tier(tier: i64) -> Option<Rarity> {
        usize::try_from(tier)
            .ok()
            .and_then(|tier| tier.checked_sub(1))
            .and_then(|idx| Self::ALL.get(idx).copied())
    }

    /// Case-sensitive; callers lowercase game input first.
    pub fn parse(name: &str) -> Option<Rarity> {
        Self::ALL.into_iter().find(|r| r.as_str() == name)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Rarity::Common => "common",
            Rarity::Uncommon => "uncommon",
            Rarity::Rare => "rare",
            Rarity::Epic => "epic",
            Rarity::Legendary => "legendary",
            Rarity::Mythic => "mythic",
            Rarity::Secret => "secret",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BackpackItem {
    pub name: String,
    pub rarity: String,
    pub count: i64,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub uuid: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub icon: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Bot {
    pub id: i64,
    /// Owning user. Not enforced: deleting a user leaves its bots in place.
    pub user_id: i64,
    pub name: String,
    pub status: BotStatus,
    pub coin: i64,
    pub level: i64,
    pub xp: i64,
    pub fish_caught: i64,
    pub rarest_fish: String,
    pub rarity: Rarity,
    pub backpack_current: i64,
    pub backpack_max: i64,
    pub token: String,
    pub game_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_update: Option<DateTime<Utc>>,
    pub has_ghostfinn: bool,
    pub has_element: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub backpack_items: Vec<BackpackItem>,
}

impl Default for Bot {
    fn default() -> Self {
        Bot {
            id: 0,
            user_id: 0,
            name: String::new(),
            status: BotStatus::Offline,
            coin: 0,
            level: 0,
            xp: 0,
            fish_caught: 0,
            rarest_fish: NO_FISH.to_owned(),
            rarity: Rarity::Common,
            backpack_current: 0,
            backpack_max: DEFAULT_BACKPACK_MAX,
            token: String::new(),
            game_id: String::new(),
            last_update: None,
            has_ghostfinn: false,
            has_element: false,
            backpack_items: Vec::new(),
        }
    }
}

impl Bot {
    pub fn new(id: i64, user_id: i64, name: String, token: String, game_id: String) -> Self {
        Bot {
            id,
            user_id,
            name,
            token,
            game_id,
            ..Default::default()
        }
    }

    pub fn is_online(&self) -> bool {
        self.status == BotStatus::Online
    }
}
