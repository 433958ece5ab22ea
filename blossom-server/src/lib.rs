//! blossom-server: HTTP front end for the blossom blob store
//!
//! Routes map one-to-one onto store operations; every request is checked
//! by the authorization gate before the store is touched.

pub mod config;
pub mod error;
pub mod logging;
pub mod middleware;
pub mod mirror;
pub mod routes;
pub mod state;
