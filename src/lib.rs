// Flashdeck API client - library root
// Token lifecycle management for the Flashdeck deck manager

pub mod auth;
pub mod config;
pub mod error;
pub mod http_client;
pub mod session;
