use std::collections::HashMap;

use crate::models::Bot;

/// Secondary index over the bot collection.
///
/// Names resolve to bot ids, and ids resolve to positions in the collection.
/// Every structural change to the collection must be mirrored here inside the
/// same write-lock critical section; [`Dataset`](super::Dataset) is the only
/// caller.
#[derive(Debug, Default)]
pub(crate) struct BotIndex {
    by_name: HashMap<String, i64>,
    slots: HashMap<i64, usize>,
}

impl BotIndex {
    /// Builds the index for a freshly loaded collection.
    ///
    /// Returns the offending id if two bots share one. Later bots win name
    /// collisions, matching what incremental inserts would produce.
    pub(crate) fn build(bots: &[Bot]) -> Result<Self, i64> {
        let mut index = BotIndex::default();
        for (position, bot) in bots.iter().enumerate() {
            if index.slots.contains_key(&bot.id) {
                return Err(bot.id);
            }
            index.insert(bot, position);
        }
        Ok(index)
    }

    /// Position of the bot currently indexed under `name`.
    pub(crate) fn lookup(&self, name: &str) -> Option<usize> {
        let id = self.by_name.get(name)?;
        self.slots.get(id).copied()
    }

    pub(crate) fn position_of(&self, id: i64) -> Option<usize> {
        self.slots.get(&id).copied()
    }

    /// Records a bot appended at `position`. Duplicate names: last writer wins.
    pub(crate) fn insert(&mut self, bot: &Bot, position: usize) {
        self.slots.insert(bot.id, position);
        self.by_name.insert(bot.name.clone(), bot.id);
    }

    /// Forgets `removed`, which used to live at `position`.
    ///
    /// `remaining` is the collection after the removal. Positions past the hole
    /// shift down by one; if another bot still carries the removed name, the
    /// name entry falls back to the last such bot.
    pub(crate) fn remove(&mut self, removed: &Bot, position: usize, remaining: &[Bot]) {
        self.slots.remove(&removed.id);
        for slot in self.slots.values_mut() {
            if *slot > position {
                *slot -= 1;
            }
        }

        if self.by_name.get(&removed.name) != Some(&removed.id) {
            return;
        }
        match remaining.iter().rev().find(|b| b.name == removed.name) {
            Some(survivor) => {
                self.by_name.insert(removed.name.clone(), survivor.id);
            }
            None => {
                self.by_name.remove(&removed.name);
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.by_name.len()
    }
}
