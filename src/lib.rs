// Smartflo Dialer - Library root for the binary and integration tests

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod http_client;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod store;
