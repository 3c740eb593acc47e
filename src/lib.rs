pub mod api;
pub mod clients;
pub mod config;
pub mod consumer;
pub mod dispatch;
pub mod error;
pub mod formatter;
pub mod models;
pub mod providers;
pub mod routing;
pub mod utils;
