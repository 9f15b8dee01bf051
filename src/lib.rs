pub mod api;
pub mod auth;
pub mod config;
pub mod engine;
pub mod error;
pub mod feed;
pub mod geo;
pub mod lifecycle;
pub mod models;
pub mod observability;
pub mod registry;
pub mod state;
pub mod store;
