pub mod analytics;
pub mod config;
pub mod db;
pub mod discovery;
pub mod geocoding;
pub mod models;
pub mod progress;
pub mod sources;
pub mod utils;
