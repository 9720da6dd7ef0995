pub mod account;
pub mod agent;
pub mod conversation;
pub mod knowledge;
pub mod user;
