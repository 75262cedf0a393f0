//! Character creation and lookup.

use std::sync::Arc;

use questline_domain::{Catalog, Character, CharacterId, DomainError, ZoneId};

use crate::infrastructure::ports::{CharacterRepo, RepoError};

#[derive(Debug, thiserror::Error)]
pub enum CharacterError {
    #[error("Character not found: {0}")]
    NotFound(CharacterId),
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Repository error: {0}")]
    Repo(#[from] RepoError),
}

impl From<DomainError> for CharacterError {
    fn from(error: DomainError) -> Self {
        Self::Validation(error.to_string())
    }
}

pub struct CharacterOps {
    characters: Arc<dyn CharacterRepo>,
    catalog: Arc<Catalog>,
}

impl CharacterOps {
    pub fn new(characters: Arc<dyn CharacterRepo>, catalog: Arc<Catalog>) -> Self {
        Self {
            characters,
            catalog,
        }
    }

    /// Create a character in `zone`. New characters start with a few
    /// supplies so they can set out on a standard expedition.
    pub async fn create(&self, name: &str, zone: &ZoneId) -> Result<Character, CharacterError> {
        let zone = self.catalog.zone(zone)?;
        let character = Character::new(name, zone.id.clone())?
            .with_item(self.catalog.supply_item().clone(), STARTING_SUPPLIES);
        self.characters.save(&character).await?;

        tracing::info!(
            character_id = %character.id(),
            zone = %zone.id,
            "Character created"
        );
        Ok(character)
    }

    pub async fn get(&self, id: CharacterId) -> Result<Character, CharacterError> {
        self.characters
            .get(id)
            .await?
            .ok_or(CharacterError::NotFound(id))
    }
}

const STARTING_SUPPLIES: u32 = 3;
