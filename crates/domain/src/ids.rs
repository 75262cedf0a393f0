use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! define_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }

            pub fn to_uuid(self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl From<$name> for Uuid {
            fn from(value: $name) -> Self {
                value.0
            }
        }
    };
}

/// Catalog keys are human-authored slugs ("old_forest", "iron_ore") rather
/// than UUIDs, so content files stay readable.
macro_rules! define_key {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(key: impl Into<String>) -> Self {
                Self(key.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

// Runtime entity IDs
define_id!(CharacterId);
define_id!(SessionId);
define_id!(CombatId);

// Catalog keys
define_key!(ZoneId);
define_key!(EnemyId);
define_key!(RecipeId);
define_key!(ItemId);
define_key!(LandmarkId);
define_key!(EventId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uuid_ids_round_trip_through_uuid() {
        let id = CharacterId::new();
        let uuid: Uuid = id.into();
        assert_eq!(CharacterId::from_uuid(uuid), id);
    }

    #[test]
    fn keys_serialize_as_plain_strings() {
        let zone = ZoneId::new("old_forest");
        let json = serde_json::to_string(&zone).unwrap();
        assert_eq!(json, "\"old_forest\"");
        assert_eq!(zone.to_string(), "old_forest");
    }
}
