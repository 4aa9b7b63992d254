// Library for the agent binary, the spool demo and tests

pub mod buffer;
pub mod config;
pub mod delivery;
pub mod error;
pub mod logging;
pub mod models;
pub mod retry;
pub mod sampler;
pub mod scheduler;
pub mod spool;
pub mod status;
pub mod version;
