//! Leader-side services used by the websocket routes.
//!
//! ARCHITECTURE
//! ============
//! Service modules own the board links, query forwarding, and store side
//! effects so route handlers stay focused on socket plumbing and auth.

pub mod board;
pub mod query;
pub mod sweep;
