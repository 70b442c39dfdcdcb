use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::database::models::UserId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: UserId,
    pub phone_number: String,
    pub name: Option<String>,
}
