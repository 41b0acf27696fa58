pub mod catalog;
pub mod error;
pub mod intent;
pub mod models;

pub use catalog::{Intent, IntentCatalog};
pub use error::LensError;
pub use intent::{display_name, is_reserved_command, normalize_text};
pub use models::*;
