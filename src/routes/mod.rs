pub mod account;
pub mod admin;
pub mod agents;
pub mod analytics;
pub mod auth;
pub mod conversations;
pub mod health;
pub mod knowledge;
