//! tvx Transport Layer
//!
//! Network access to a running full node.
//!
//! This crate provides:
//! - [`lotus`]: JSON-RPC client implementing [`ChainClient`](tvx_types::ChainClient)
//!   and [`ObjectFetcher`](tvx_types::ObjectFetcher)
//! - [`api_info`]: parsing of `FULLNODE_API_INFO`-style endpoint strings
//!
//! # Example
//!
//! ```ignore
//! use tvx_transport::{ApiInfo, LotusClient};
//!
//! let info: ApiInfo = "eyJhbGci...:/ip4/127.0.0.1/tcp/1234/http".parse()?;
//! let client = LotusClient::from_api_info(&info);
//! let head = client.chain_head()?;
//! ```

pub mod api_info;
pub mod lotus;

pub use api_info::{ApiInfo, FULLNODE_API_INFO_ENV};
pub use lotus::LotusClient;
