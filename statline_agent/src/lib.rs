//! statline agent: samples host resource usage and streams it to a status
//! collector over an authenticated line protocol.

pub mod agent;
pub mod config;
pub mod connection;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod probe;
pub mod procfs;
pub mod reporter;
pub mod throughput;
pub mod types;
