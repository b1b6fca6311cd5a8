pub mod classifier;
pub mod clock;
pub mod config;
pub mod domain;
pub mod entities;
pub mod error;
pub mod gateway;
pub mod metrics;
pub mod migrator;
pub mod rules;
pub mod scheduler;
pub mod store;
pub mod telemetry;

#[cfg(test)]
mod testing;

pub use sea_orm;
