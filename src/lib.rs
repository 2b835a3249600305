//! boardlink — local coordination service between editor instances and
//! visual boards.
//!
//! One process per machine leads: it binds the well-known port, accepts
//! board connections on `/board` and editor connections on `/client`, keeps
//! the [`store::CardStore`] in sync with each board, and forwards queries.
//! Every other editor instance follows the leader over [`client::RpcClient`]
//! and takes over the port when the leader goes away.

pub mod backoff;
pub mod card;
pub mod client;
pub mod config;
pub mod discovery;
pub mod frame;
pub mod launcher;
pub mod pending;
pub mod query;
pub mod routes;
pub mod server;
pub mod services;
pub mod state;
pub mod store;
pub mod supervisor;
pub mod token;

#[cfg(test)]
#[path = "e2e_test.rs"]
mod e2e_test;
