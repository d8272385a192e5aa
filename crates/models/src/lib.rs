//! Domain types for the user save service.
//!
//! - [`usersave`]: the persisted `UserSave` document and its JSON codec.
//! - [`user_id`]: the storage key derived from a verified token.

pub mod errors;
pub mod user_id;
pub mod usersave;

pub use errors::{CodecError, InvalidUserId};
pub use user_id::UserId;
pub use usersave::{Currency, Cycle, Expense, Savings, UserSave};
