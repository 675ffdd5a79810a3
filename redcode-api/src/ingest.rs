//! Maps a game-state report from the in-game script onto a [`Bot`].

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};

use crate::config::{ASSET_ID_PREFIX, ELEMENT_ROD, FISH_CATEGORY, GHOSTFINN_ROD, NO_FISH};
use crate::models::{BackpackItem, Bot, BotStatus, Rarity};

/// Reads `null` as the type's default. The in-game encoder emits `null` for
/// empty tables.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Deserialize)]
pub struct GameDataReport {
    /// Name of the bot this report belongs to.
    #[serde(default, deserialize_with = "null_as_default")]
    pub username: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub data: GameState,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct GameState {
    #[serde(deserialize_with = "null_as_default")]
    pub player: PlayerState,
    /// Items grouped by category, e.g. `Fishes` or `Rods`. A `null` category is empty.
    #[serde(deserialize_with = "null_as_default")]
    pub inventory: BTreeMap<String, Option<Vec<InventoryItem>>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PlayerState {
    #[serde(rename = "Coins", deserialize_with = "null_as_default")]
    pub coins: i64,
    #[serde(rename = "Level", deserialize_with = "null_as_default")]
    pub level: i64,
    #[serde(rename = "XP", deserialize_with = "null_as_default")]
    pub xp: i64,
    #[serde(rename = "UserId", deserialize_with = "null_as_default")]
    pub user_id: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct InventoryItem {
    #[serde(rename = "Name", deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(rename = "Rarity", deserialize_with = "null_as_default")]
    pub rarity: String,
    /// 1-based rarity tier; overrides `rarity` when positive.
    #[serde(rename = "Tier", deserialize_with = "null_as_default")]
    pub tier: i64,
    #[serde(rename = "Quantity", deserialize_with = "null_as_default")]
    pub quantity: i64,
    #[serde(rename = "Icon", deserialize_with = "null_as_default")]
    pub icon: String,
    #[serde(rename = "UUID", deserialize_with = "null_as_default")]
    pub uuid: String,
    #[serde(rename = "Type", deserialize_with = "null_as_default")]
    pub kind: String,
}

impl InventoryItem {
    fn rarity_name(&self) -> String {
        match Rarity::from_tier(self.tier) {
            Some(rarity) => rarity.as_str().to_owned(),
            None => self.rarity.to_lowercase(),
        }
    }

    fn asset_id(&self) -> &str {
        self.icon.strip_prefix(ASSET_ID_PREFIX).unwrap_or_default()
    }
}

/// Applies a report to `bot`, marking it online as of `now`.
///
/// Flags, fish counts and the backpack are recomputed from the report, never
/// merged with what the bot held before. `rarity` only moves when the report
/// ranks a fish; otherwise the last known value stays.
pub fn apply(bot: &mut Bot, state: &GameState, now: DateTime<Utc>) {
    bot.status = BotStatus::Online;
    bot.coin = state.player.coins;
    bot.level = state.player.level;
    bot.xp = state.player.xp;
    bot.last_update = Some(now);

    let mut has_ghostfinn = false;
    let mut has_element = false;
    let mut fish_caught = 0;
    let mut rarest: Option<(Rarity, &str)> = None;
    let mut items = Vec::new();

    for (category, entries) in &state.inventory {
        let is_fish = category.eq_ignore_ascii_case(FISH_CATEGORY);
        for item in entries.iter().flatten() {
            match item.name.as_str() {
                GHOSTFINN_ROD => has_ghostfinn = true,
                ELEMENT_ROD => has_element = true,
                _ => {}
            }

            let rarity_name = item.rarity_name();
            if is_fish {
                fish_caught += item.quantity;
                if let Some(rarity) = Rarity::parse(&rarity_name) {
                    // Ties keep the first fish seen.
                    if rarest.is_none_or(|(best, _)| rarity > best) {
                        rarest = Some((rarity, &item.name));
                    }
                }
            }

            items.push(BackpackItem {
                name: item.name.clone(),
                id: item.asset_id().to_owned(),
                rarity: rarity_name,
                count: item.quantity,
                kind: item.kind.clone(),
                uuid: item.uuid.clone(),
                icon: item.icon.clone(),
            });
        }
    }

    bot.has_ghostfinn = has_ghostfinn;
    bot.has_element = has_element;
    bot.fish_caught = fish_caught;
    match rarest {
        Some((rarity, name)) => {
            bot.rarity = rarity;
            bot.rarest_fish = name.to_owned();
        }
        None => bot.rarest_fish = NO_FISH.to_owned(),
    }
    bot.backpack_current = items.iter().map(|i| i.count).sum();
    bot.backpack_items = items;
}
