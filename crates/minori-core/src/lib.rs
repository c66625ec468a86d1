pub mod config;
pub mod error;
pub mod index;
pub mod models;
pub mod normalize;
pub mod orchestrator;
pub mod overrides;
pub mod remote;
pub mod resolver;
pub mod storage;
