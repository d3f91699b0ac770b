/// Account and session endpoints
pub mod auth;
/// Self-update endpoints
pub mod updates;
