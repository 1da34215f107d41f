pub mod airbnb;
pub mod api_client;
pub mod availability;
pub mod boundary;
pub mod checkpoint;
pub mod config;
pub mod dedup;
pub mod error;
pub mod export;
pub mod funda;
pub mod logging;
pub mod models;
pub mod orchestrator;
pub mod params;
pub mod parser;
pub mod progress;
pub mod room_type;
pub mod run_tracker;
pub mod spatial;
