//! Query service — forwards editor queries to boards and applies the
//! store side effects of the ones that change board state.
//!
//! DESIGN
//! ======
//! The board stays the source of truth: a side effect is applied only after
//! the board acknowledged the query. Pure reads are forwarded unchanged.
//!
//! | query          | store effect                                  |
//! |----------------|-----------------------------------------------|
//! | `setBoardName` | rename                                        |
//! | `attachCard`   | upsert the card, broadcast `updateCard`       |
//! | `cardStatus`   | update status and code link, broadcast        |
//! | `cards`        | replace the board's cards                     |

use std::time::Duration;

use serde_json::Value;
use tracing::{info, warn};

use crate::card::Card;
use crate::frame::{BoardEvent, ErrorCode};
use crate::query::{CardStatusArgs, Query, QueryParseError};
use crate::services::board::broadcast;
use crate::state::AppState;
use crate::store::CardTarget;

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("no connection to board {0}")]
    NotConnected(String),
    #[error("board did not answer {name} within {timeout:?}")]
    Timeout { name: &'static str, timeout: Duration },
    #[error("board connection closed")]
    ChannelClosed,
    #[error("board sent an unexpected {name} response: {message}")]
    InvalidResponse { name: &'static str, message: String },
    #[error(transparent)]
    Parse(#[from] QueryParseError),
}

impl ErrorCode for QueryError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::NotConnected(_) => "E_NOT_CONNECTED",
            Self::Timeout { .. } => "E_TIMEOUT",
            Self::ChannelClosed => "E_CHANNEL_CLOSED",
            Self::InvalidResponse { .. } => "E_INVALID_RESPONSE",
            Self::Parse(e) => e.error_code(),
        }
    }
}

// =============================================================================
// DISPATCH
// =============================================================================

/// Forward a query to the board's active link and apply its side effects.
///
/// # Errors
///
/// [`QueryError::NotConnected`] when the board has no live link, otherwise
/// whatever the link reports.
pub async fn dispatch(state: &AppState, board_id: &str, query: Query) -> Result<Value, QueryError> {
    let Some(link) = state.link_for(board_id).await else {
        return Err(QueryError::NotConnected(board_id.to_owned()));
    };

    let value = link.query(&query, state.query_timeout).await?;
    apply_side_effects(state, board_id, query, &value).await;
    Ok(value)
}

async fn apply_side_effects(state: &AppState, board_id: &str, query: Query, value: &Value) {
    match query {
        Query::SetBoardName(name) => {
            if state.store().set_board_name(board_id, &name).is_some() {
                info!(%board_id, %name, "query: board renamed");
            }
        }
        Query::AttachCard(requested) => {
            // The board answers with the placed card when it assigned a link.
            let mut card = serde_json::from_value::<Card>(value.clone()).unwrap_or(requested);
            card.set_board_id(board_id);
            if state.store().set_card(CardTarget::Board(board_id), card.clone()) {
                let miro_link = card.miro_link().map(str::to_owned);
                broadcast(state, BoardEvent::UpdateCard { miro_link, card: Some(card) }).await;
            }
        }
        Query::CardStatus(CardStatusArgs { miro_link, status, code_link }) => {
            let updated = state.store().set_card_status(&miro_link, status, code_link);
            match updated {
                Some(card) => {
                    broadcast(state, BoardEvent::UpdateCard { miro_link: Some(miro_link), card: Some(card) }).await;
                }
                None => warn!(%board_id, %miro_link, "query: status for unknown card"),
            }
        }
        Query::Cards => match serde_json::from_value::<Vec<Card>>(value.clone()) {
            Ok(cards) => {
                state.store().set_board_cards(board_id, cards);
            }
            Err(e) => warn!(%board_id, error = %e, "query: cards response not applied"),
        },
        Query::GetIdToken
        | Query::GetBoardInfo
        | Query::Tags
        | Query::TagCards(_)
        | Query::SelectCard(_)
        | Query::Selected
        | Query::NewCards(..)
        | Query::HoverCard(_) => {}
    }
}

#[cfg(test)]
#[path = "query_test.rs"]
mod tests;
