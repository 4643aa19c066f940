//! Connector for the Parallel task and search APIs.
//!
//! Parameters go through [`request`] into JSON bodies, [`runner`] submits and
//! long-polls task runs over a [`transport::Transport`], and [`flatten`]
//! turns completed runs into flat records. [`host`] is the per-item entry
//! point plus a batch driver.

pub mod config;
pub mod consts;
pub mod error;
pub mod flatten;
pub mod host;
pub mod request;
pub mod runner;
pub mod transport;

pub use error::{Error, Result};
