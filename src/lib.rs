// TDMQ CMQ client - library root

pub mod config;
pub mod error;
pub mod http_client;
pub mod models;
pub mod queue;
pub mod route;
pub mod signer;
pub mod topic;
pub mod validate;

#[cfg(feature = "bench")]
pub mod bench;

pub use config::{ClientConfig, HttpMethod};
pub use error::{CmqError, Result};
pub use http_client::{CmqClient, Params};
pub use models::CmqResult;
pub use signer::{SignMethod, Signer};
pub use validate::Limits;
