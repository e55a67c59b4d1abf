#[macro_use]
extern crate serde;
extern crate serde_json;

pub mod adapter;
pub mod agent;
pub mod config;
pub mod driver;
pub mod error;
pub mod exec;
pub mod extension;
pub mod hostnet;
pub mod orch;
pub mod runtime;

#[cfg(test)]
pub(crate) mod testutil;
