/// Durable update bookkeeping in the `system_info` table
pub mod system_info;
/// Accounts, password hashing and admin seeding
pub mod users;
