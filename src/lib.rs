pub mod abi;
pub mod cache;
pub mod chain_rpc;
pub mod config;
pub mod context;
pub mod error;
pub mod identity;
pub mod interfaces;
pub mod logging;
pub mod plan;
pub mod plugins;
pub mod registry;
pub mod runtime_paths;
pub mod shell;
pub mod tools;

pub use error::{MeshgateError, Result};
