pub mod config;
pub mod dispatch;
pub mod error;
pub mod localize;
pub mod orchestrator;
pub mod prompt;
pub mod response;
pub mod rewrite;
pub mod server;
pub mod storage;
pub mod tasks;
