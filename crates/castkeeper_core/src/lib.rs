pub mod auth_provider;
pub mod config;
pub mod entities;
pub mod error;
pub mod orchestrator;
pub mod ports;
pub mod runtime;
pub mod services;
pub mod status;

#[cfg(test)]
mod testing;

pub use error::Error;
pub use runtime::{Collaborators, Runtime};
