pub mod apis;
pub mod browser;
pub mod common;
pub mod config;
pub mod extract;
pub mod logging;
pub mod metrics;
pub mod normalize;
pub mod pipeline;
pub mod storage;
