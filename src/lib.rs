pub mod error;
pub mod store;
pub mod model;
pub mod config;
pub mod media;
pub mod identity;
pub mod activity;
pub mod content;
pub mod accounts;
pub mod developer;
pub mod assistant;
pub mod portal;
pub mod server;
pub mod cli;
