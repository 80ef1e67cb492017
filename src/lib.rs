pub mod auth;
pub mod config;
pub mod connectors;
pub mod db;
pub mod error;
pub mod matcher;
pub mod output;
pub mod probe;
pub mod server;
