// externally visible interfaces
pub mod cache;
pub mod envelope;
pub mod error;
pub mod gateway;
pub mod gateway_config;
pub mod home_assistant;
pub mod metric_collector;
pub mod mqtt_config;
pub mod mqtt_wrapper;
pub mod poller;
pub mod protos;
pub mod queries;
pub mod resource;
pub mod snapshot;
pub mod timeout_lock;
pub mod transport;
pub mod vitals;

// internal interfaces
mod home_assistant_config;

pub use error::{Error, Result};
