pub mod orchestrator;
pub mod scheduler;
pub mod session;
