//! Domain entities

pub mod catalog;

pub use catalog::{
    Catalog, CatalogData, EnemyDef, EnemyLoot, EventDef, ItemDef, LandmarkDef, Rarity, RecipeDef,
    ZoneDef,
};
