//! At most one in-flight combat action per character.

use std::sync::Arc;

use dashmap::DashSet;
use questline_domain::CharacterId;

#[derive(Clone, Default)]
pub struct SingleFlight {
    busy: Arc<DashSet<CharacterId>>,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the character. `None` while another call holds it.
    pub fn try_acquire(&self, character_id: CharacterId) -> Option<FlightGuard> {
        self.busy.insert(character_id).then(|| FlightGuard {
            busy: self.busy.clone(),
            character_id,
        })
    }

    pub fn is_busy(&self, character_id: CharacterId) -> bool {
        self.busy.contains(&character_id)
    }
}

/// Releases the character when dropped, including on early return.
pub struct FlightGuard {
    busy: Arc<DashSet<CharacterId>>,
    character_id: CharacterId,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.busy.remove(&self.character_id);
    }
}
