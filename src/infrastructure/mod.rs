pub mod config;
pub mod limiter;
pub mod network;
pub mod storage;
