//! Agent Card Registry
//!
//! Process-local registry of agent cards, rebuilt at startup. Entries are
//! write-once per id; replacement goes through an explicit update.

use crate::error::{ApiError, ApiResult};
use std::collections::HashMap;
use std::sync::RwLock;
use waypoint_core::AgentCard;

/// In-memory agent card registry.
pub struct AgentRegistry {
    cards: RwLock<HashMap<String, AgentCard>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self {
            cards: RwLock::new(HashMap::new()),
        }
    }

    /// Register a new card. Fails if the id is taken.
    pub fn register(&self, card: AgentCard) -> ApiResult<()> {
        let mut cards = self.cards.write().expect("agent registry lock");
        if cards.contains_key(&card.id) {
            return Err(ApiError::already_exists("Agent", &card.id));
        }
        cards.insert(card.id.clone(), card);
        Ok(())
    }

    /// Replace an existing card.
    pub fn update(&self, card: AgentCard) -> ApiResult<()> {
        let mut cards = self.cards.write().expect("agent registry lock");
        if !cards.contains_key(&card.id) {
            return Err(ApiError::agent_not_found(&card.id));
        }
        cards.insert(card.id.clone(), card);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<AgentCard> {
        let cards = self.cards.read().expect("agent registry lock");
        cards.get(id).cloned()
    }

    /// All registered cards, sorted by id for stable output.
    pub fn list(&self) -> Vec<AgentCard> {
        let cards = self.cards.read().expect("agent registry lock");
        let mut all: Vec<AgentCard> = cards.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    /// Agents advertising a given capability.
    pub fn find_by_capability(&self, capability: &str) -> Vec<AgentCard> {
        let cards = self.cards.read().expect("agent registry lock");
        cards
            .values()
            .filter(|card| card.has_capability(capability))
            .cloned()
            .collect()
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}
