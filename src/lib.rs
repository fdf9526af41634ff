//! Cancellable repeating poller for JSON-RPC endpoints.
//!
//! - [`poll`] - the poller, its sessions, and broadcast fan-out
//! - [`client`] - request producers for block number and balance
//! - [`config`] - environment configuration
//! - [`logging`] - tracing setup

pub mod client;
pub mod config;
pub mod logging;
pub mod poll;
