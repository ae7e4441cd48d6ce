pub mod config;
pub mod errors;
pub mod handlers;
pub mod health;
pub mod messaging;
pub mod metrics;
pub mod models;
pub mod pricing;
pub mod relay;
pub mod service;
pub mod state;
pub mod store;
pub mod utils;
