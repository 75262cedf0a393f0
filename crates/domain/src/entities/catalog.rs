//! Static game content: zones, items, recipes, enemies, landmarks, events.
//!
//! The catalog is read-only at runtime. It is deserialized from a flat
//! [`CatalogData`] document and validated once, so lookups afterwards only
//! fail for ids supplied by callers.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::value_objects::CombatStats;
use crate::{EnemyId, EventId, ItemId, LandmarkId, RecipeId, ZoneId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Rarity {
    #[default]
    Common,
    Uncommon,
    Rare,
    Epic,
    Legendary,
}

impl Rarity {
    /// Relative draw weight in loot tables.
    pub fn weight(&self) -> u32 {
        match self {
            Self::Common => 60,
            Self::Uncommon => 25,
            Self::Rare => 10,
            Self::Epic => 4,
            Self::Legendary => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDef {
    pub id: ItemId,
    pub name: String,
    #[serde(default)]
    pub rarity: Rarity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneDef {
    pub id: ZoneId,
    pub name: String,
    pub danger: u32,
    pub tier: u32,
    /// Map position used to derive travel distance.
    pub position: (i32, i32),
    /// Base duration of a standard expedition, in seconds.
    pub exploration_seconds: u64,
    pub discovery_chance_percent: u32,
    pub event_chance_permille: u32,
    #[serde(default)]
    pub loot: Vec<ItemId>,
    #[serde(default)]
    pub landmarks: Vec<LandmarkId>,
    #[serde(default)]
    pub events: Vec<EventId>,
}

impl ZoneDef {
    /// Travel distance between two zones (rounded Euclidean, at least 1).
    pub fn distance_to(&self, other: &ZoneDef) -> u32 {
        let dx = f64::from(self.position.0 - other.position.0);
        let dy = f64::from(self.position.1 - other.position.1);
        (dx.hypot(dy).round() as u32).max(1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeDef {
    pub id: RecipeId,
    pub name: String,
    pub tier: u32,
    pub output: ItemId,
    #[serde(default = "one")]
    pub output_quantity: u32,
    pub seconds_per_unit: u64,
    /// Items consumed per crafted unit.
    #[serde(default)]
    pub inputs: BTreeMap<ItemId, u32>,
    /// Byproducts that may turn up while working.
    #[serde(default)]
    pub byproducts: Vec<ItemId>,
    #[serde(default)]
    pub experience_per_unit: u64,
}

fn one() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnemyLoot {
    pub item: ItemId,
    pub chance_percent: u32,
    #[serde(default = "one")]
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnemyDef {
    pub id: EnemyId,
    pub name: String,
    pub level: u32,
    pub stats: CombatStats,
    pub experience: u64,
    pub gold_min: u32,
    pub gold_max: u32,
    #[serde(default)]
    pub loot: Vec<EnemyLoot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LandmarkDef {
    pub id: LandmarkId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDef {
    pub id: EventId,
    pub name: String,
    pub description: String,
}

/// Serialized shape of the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogData {
    #[serde(default)]
    pub items: Vec<ItemDef>,
    #[serde(default)]
    pub zones: Vec<ZoneDef>,
    #[serde(default)]
    pub recipes: Vec<RecipeDef>,
    #[serde(default)]
    pub enemies: Vec<EnemyDef>,
    #[serde(default)]
    pub landmarks: Vec<LandmarkDef>,
    #[serde(default)]
    pub events: Vec<EventDef>,
    /// Item packed as expedition supplies.
    pub supply_item: ItemId,
}

/// Validated, indexed game content.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "CatalogData", into = "CatalogData")]
pub struct Catalog {
    items: BTreeMap<ItemId, ItemDef>,
    zones: BTreeMap<ZoneId, ZoneDef>,
    recipes: BTreeMap<RecipeId, RecipeDef>,
    enemies: BTreeMap<EnemyId, EnemyDef>,
    landmarks: BTreeMap<LandmarkId, LandmarkDef>,
    events: BTreeMap<EventId, EventDef>,
    supply_item: ItemId,
}

impl Catalog {
    /// Index and cross-check catalog content.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if any definition references an
    /// item, landmark or event that is not defined, or if a zone or recipe
    /// could never produce a positive activity duration.
    pub fn new(data: CatalogData) -> Result<Self, DomainError> {
        let items: BTreeMap<_, _> = data.items.into_iter().map(|i| (i.id.clone(), i)).collect();
        let landmarks: BTreeMap<_, _> = data
            .landmarks
            .into_iter()
            .map(|l| (l.id.clone(), l))
            .collect();
        let events: BTreeMap<_, _> = data.events.into_iter().map(|e| (e.id.clone(), e)).collect();

        let require_item = |item: &ItemId, owner: &str| {
            if items.contains_key(item) {
                Ok(())
            } else {
                Err(DomainError::validation(format!(
                    "{} references unknown item {}",
                    owner, item
                )))
            }
        };

        require_item(&data.supply_item, "catalog supply_item")?;

        for zone in &data.zones {
            if zone.exploration_seconds == 0 {
                return Err(DomainError::validation(format!(
                    "zone {} has no exploration duration",
                    zone.id
                )));
            }
            for item in &zone.loot {
                require_item(item, zone.id.as_str())?;
            }
            if let Some(missing) = zone.landmarks.iter().find(|l| !landmarks.contains_key(*l)) {
                return Err(DomainError::validation(format!(
                    "zone {} references unknown landmark {}",
                    zone.id, missing
                )));
            }
            if let Some(missing) = zone.events.iter().find(|e| !events.contains_key(*e)) {
                return Err(DomainError::validation(format!(
                    "zone {} references unknown event {}",
                    zone.id, missing
                )));
            }
        }

        for recipe in &data.recipes {
            if recipe.seconds_per_unit == 0 {
                return Err(DomainError::validation(format!(
                    "recipe {} has no crafting time",
                    recipe.id
                )));
            }
            require_item(&recipe.output, recipe.id.as_str())?;
            for item in recipe.inputs.keys().chain(recipe.byproducts.iter()) {
                require_item(item, recipe.id.as_str())?;
            }
        }

        for enemy in &data.enemies {
            if enemy.gold_min > enemy.gold_max {
                return Err(DomainError::validation(format!(
                    "enemy {} has gold_min above gold_max",
                    enemy.id
                )));
            }
            for loot in &enemy.loot {
                require_item(&loot.item, enemy.id.as_str())?;
            }
        }

        Ok(Self {
            zones: data.zones.into_iter().map(|z| (z.id.clone(), z)).collect(),
            recipes: data.recipes.into_iter().map(|r| (r.id.clone(), r)).collect(),
            enemies: data.enemies.into_iter().map(|e| (e.id.clone(), e)).collect(),
            items,
            landmarks,
            events,
            supply_item: data.supply_item,
        })
    }

    pub fn zone(&self, id: &ZoneId) -> Result<&ZoneDef, DomainError> {
        self.zones
            .get(id)
            .ok_or_else(|| DomainError::validation(format!("Unknown zone: {}", id)))
    }

    pub fn recipe(&self, id: &RecipeId) -> Result<&RecipeDef, DomainError> {
        self.recipes
            .get(id)
            .ok_or_else(|| DomainError::validation(format!("Unknown recipe: {}", id)))
    }

    pub fn enemy(&self, id: &EnemyId) -> Result<&EnemyDef, DomainError> {
        self.enemies
            .get(id)
            .ok_or_else(|| DomainError::validation(format!("Unknown enemy: {}", id)))
    }

    pub fn item(&self, id: &ItemId) -> Option<&ItemDef> {
        self.items.get(id)
    }

    pub fn landmark(&self, id: &LandmarkId) -> Option<&LandmarkDef> {
        self.landmarks.get(id)
    }

    pub fn event(&self, id: &EventId) -> Option<&EventDef> {
        self.events.get(id)
    }

    pub fn supply_item(&self) -> &ItemId {
        &self.supply_item
    }

    /// Rarity weight of an item; unknown items draw as common.
    pub fn item_weight(&self, id: &ItemId) -> u32 {
        self.items
            .get(id)
            .map(|item| item.rarity.weight())
            .unwrap_or_else(|| Rarity::Common.weight())
    }
}

impl TryFrom<CatalogData> for Catalog {
    type Error = DomainError;

    fn try_from(data: CatalogData) -> Result<Self, Self::Error> {
        Self::new(data)
    }
}

impl From<Catalog> for CatalogData {
    fn from(catalog: Catalog) -> Self {
        Self {
            items: catalog.items.into_values().collect(),
            zones: catalog.zones.into_values().collect(),
            recipes: catalog.recipes.into_values().collect(),
            enemies: catalog.enemies.into_values().collect(),
            landmarks: catalog.landmarks.into_values().collect(),
            events: catalog.events.into_values().collect(),
            supply_item: catalog.supply_item,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data() -> CatalogData {
        CatalogData {
            items: vec![
                ItemDef {
                    id: ItemId::from("ration"),
                    name: "Ration".into(),
                    rarity: Rarity::Common,
                },
                ItemDef {
                    id: ItemId::from("amber"),
                    name: "Amber".into(),
                    rarity: Rarity::Rare,
                },
            ],
            zones: vec![ZoneDef {
                id: ZoneId::from("marsh"),
                name: "Marsh".into(),
                danger: 4,
                tier: 1,
                position: (3, 4),
                exploration_seconds: 60,
                discovery_chance_percent: 20,
                event_chance_permille: 10,
                loot: vec![ItemId::from("amber")],
                landmarks: vec![],
                events: vec![],
            }],
            recipes: vec![],
            enemies: vec![],
            landmarks: vec![],
            events: vec![],
            supply_item: ItemId::from("ration"),
        }
    }

    #[test]
    fn valid_catalog_indexes_content() {
        let catalog = Catalog::new(data()).unwrap();
        assert_eq!(catalog.zone(&ZoneId::from("marsh")).unwrap().danger, 4);
        assert_eq!(catalog.item_weight(&ItemId::from("amber")), 10);
        assert!(catalog.zone(&ZoneId::from("desert")).is_err());
    }

    #[test]
    fn unknown_loot_item_is_rejected() {
        let mut data = data();
        data.zones[0].loot.push(ItemId::from("dragon_scale"));
        let err = Catalog::new(data).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn unknown_landmark_is_rejected() {
        let mut data = data();
        data.zones[0].landmarks.push(LandmarkId::from("lost_tower"));
        assert!(Catalog::new(data).is_err());
    }

    #[test]
    fn zone_distance_is_rounded_euclidean() {
        let data = data();
        let mut origin = data.zones[0].clone();
        origin.position = (0, 0);
        assert_eq!(origin.distance_to(&data.zones[0]), 5);
        assert_eq!(origin.distance_to(&origin), 1);
    }

    #[test]
    fn catalog_deserializes_through_validation() {
        let json = serde_json::to_string(&data()).unwrap();
        let catalog: Catalog = serde_json::from_str(&json).unwrap();
        assert_eq!(catalog.supply_item(), &ItemId::from("ration"));

        let broken = json.replace("\"supply_item\":\"ration\"", "\"supply_item\":\"rope\"");
        assert!(serde_json::from_str::<Catalog>(&broken).is_err());
    }
}
