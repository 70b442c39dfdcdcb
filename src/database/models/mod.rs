pub mod floor;
pub mod notification;
pub mod user;

/// Numeric identifier of a user.
pub type UserId = i64;

/// Numeric identifier of a property, floor or notification.
pub type EntityId = i64;

pub use floor::{Floor, OccupiedFloor};
pub use notification::{Notification, NotificationKind, NotificationStatus, NotificationView};
pub use user::User;
