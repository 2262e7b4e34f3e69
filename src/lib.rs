pub mod auth;
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod permissions;
pub mod security;
pub mod server;
pub mod shared;
pub mod tickets;
