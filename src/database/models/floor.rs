use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::database::models::{EntityId, UserId};

/// A rental unit and its current occupant, joined with the property name for message text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Floor {
    pub id: EntityId,
    pub property_id: EntityId,
    pub name: String,
    pub property_name: String,
    pub rent: i64,
    pub tenant: Option<UserId>,
}

/// An occupied floor together with everything the reminder sweep needs.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct OccupiedFloor {
    pub floor_id: EntityId,
    pub property_id: EntityId,
    pub tenant: UserId,
    pub manager: Option<UserId>,
    pub property_name: String,
    pub floor_name: String,
    pub rent: i64,
}
