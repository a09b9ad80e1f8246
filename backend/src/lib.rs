//! Request gate for the course platform: session refresh, password-recovery
//! lockout and role-gated redirects in front of the application server.

pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod identity;
pub mod middleware;
pub mod models;
pub mod repositories;
pub mod routes;
pub mod state;
pub mod utils;
