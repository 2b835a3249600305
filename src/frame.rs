//! Frame — every message that crosses a boardlink socket.
//!
//! ARCHITECTURE
//! ============
//! Two channels share one listener. The board channel carries queries from
//! the leader to the board and results plus board events back. The editor
//! channel carries queries from editor instances to the leader and results
//! plus broadcast events back. Every message is one JSON text frame tagged
//! by `type`.
//!
//! DESIGN
//! ======
//! - Requests and results correlate via `requestId`, never by arrival order.
//! - Board results are raw values: the board is an external peer and
//!   answers in its own shape.
//! - Editor results use the [`Reply`] envelope so a failed query is never
//!   confused with a query that legitimately returned `null` or `false`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::card::{BoardInfo, Card};

// =============================================================================
// ERROR CODES
// =============================================================================

/// Grepable error code carried by failed [`Reply`] envelopes.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;
}

// =============================================================================
// BOARD CHANNEL
// =============================================================================

/// Leader → board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum BoardRequest {
    Query { name: String, request_id: String, data: Vec<Value> },
}

/// Board → leader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum BoardMessage {
    QueryResult {
        request_id: String,
        #[serde(default)]
        response: Value,
    },
    NavigateTo { card: Card },
    Card { url: String, card: Option<Card> },
}

// =============================================================================
// EDITOR CHANNEL
// =============================================================================

/// Editor instance → leader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientRequest {
    Query {
        board_id: String,
        name: String,
        request_id: String,
        #[serde(default)]
        data: Vec<Value>,
    },
}

/// Leader → editor instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    QueryResult { request_id: String, response: Reply },
    Event { event: BoardEvent },
}

/// Events the leader fires locally and broadcasts to every editor instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum BoardEvent {
    Connect { board_info: BoardInfo },
    Disconnect {},
    NavigateToCard { card: Card },
    UpdateCard { miro_link: Option<String>, card: Option<Card> },
}

// =============================================================================
// REPLY ENVELOPE
// =============================================================================

/// Result envelope for editor-channel queries:
/// `{ok: true, value}` or `{ok: false, reason, code}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl Reply {
    #[must_use]
    pub fn success(value: Value) -> Self {
        Self { ok: true, value: Some(value), reason: None, code: None }
    }

    #[must_use]
    pub fn failure(err: &(impl ErrorCode + ?Sized)) -> Self {
        Self { ok: false, value: None, reason: Some(err.to_string()), code: Some(err.error_code().to_owned()) }
    }

    /// Split into the value or the `(code, reason)` pair.
    ///
    /// # Errors
    ///
    /// Returns the failure code and reason when `ok` is false.
    pub fn into_result(self) -> Result<Value, (String, String)> {
        if self.ok {
            return Ok(self.value.unwrap_or(Value::Null));
        }
        Err((
            self.code.unwrap_or_else(|| "E_UNKNOWN".to_owned()),
            self.reason.unwrap_or_default(),
        ))
    }
}

// =============================================================================
// HELPERS
// =============================================================================

/// Fresh correlation id for a request.
#[must_use]
pub fn new_request_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
#[path = "frame_test.rs"]
mod tests;
