//! Behavioral constants for new records and game-data ingestion.

/// Backpack capacity assigned to freshly registered bots.
pub const DEFAULT_BACKPACK_MAX: i64 = 100;

/// `rarestFish` value for bots that have not reported any fish.
pub const NO_FISH: &str = "None";

pub const API_KEY_PREFIX: &str = "ts_";
pub const API_KEY_BYTES: usize = 16;

/// Inventory category whose items count as caught fish (matched case-insensitively).
pub const FISH_CATEGORY: &str = "fishes";
pub const GHOSTFINN_ROD: &str = "Ghostfinn Rod";
pub const ELEMENT_ROD: &str = "Element Rod";
pub const ASSET_ID_PREFIX: &str = "rbxassetid://";
