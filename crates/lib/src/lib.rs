//! Chat relay core library: dispatcher, pending reply store, gateway, and polling client
//! used by the CLI.

pub mod automation;
pub mod callback;
pub mod client;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod gateway;
pub mod init;
pub mod lead;
pub mod lenient;
pub mod llm;
pub mod pending;
pub mod session;
