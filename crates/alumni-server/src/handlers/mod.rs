pub mod admin_users;
pub mod alumni;
pub mod auth;
pub mod health;
pub mod identity;
pub mod profile_update_requests;
pub mod scraper;
pub mod stats;
pub mod users;
