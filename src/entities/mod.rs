//! Entity module - Contains all SeaORM entity definitions for the database.
//! Each entity has a Model struct for data and an Entity struct for operations.

pub mod system_info;
pub mod user;

// Re-export specific types to avoid conflicts
pub use system_info::{
    Column as SystemInfoColumn, Entity as SystemInfo, Model as SystemInfoModel,
};
pub use user::{Column as UserColumn, Entity as User, Model as UserModel};
