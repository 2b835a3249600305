//! Query — the typed operation set the board answers.
//!
//! On the wire a query is `name` plus a positional `data` array. Inside the
//! crate it is a [`Query`] value, parsed once at the socket edge so the
//! dispatch layer matches on variants instead of strings.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::card::{Card, CardStatus, TagRef};
use crate::frame::ErrorCode;

// =============================================================================
// ARGUMENT TYPES
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagCardsArgs {
    pub miro_link: Vec<String>,
    pub tag: TagRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardStatusArgs {
    pub miro_link: String,
    pub status: CardStatus,
    #[serde(default)]
    pub code_link: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCardsOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect: Option<Vec<String>>,
}

// =============================================================================
// QUERY
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    GetIdToken,
    SetBoardName(String),
    GetBoardInfo,
    Tags,
    AttachCard(Card),
    TagCards(TagCardsArgs),
    SelectCard(String),
    CardStatus(CardStatusArgs),
    Cards,
    Selected,
    NewCards(Vec<Card>, Option<NewCardsOptions>),
    HoverCard(String),
}

#[derive(Debug, thiserror::Error)]
pub enum QueryParseError {
    #[error("unknown query: {0}")]
    UnknownQuery(String),
    #[error("invalid arguments for {name}: {message}")]
    InvalidArgs { name: &'static str, message: String },
}

impl ErrorCode for QueryParseError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::UnknownQuery(_) => "E_UNKNOWN_QUERY",
            Self::InvalidArgs { .. } => "E_INVALID_ARGS",
        }
    }
}

impl Query {
    /// Wire name of the operation.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::GetIdToken => "getIdToken",
            Self::SetBoardName(_) => "setBoardName",
            Self::GetBoardInfo => "getBoardInfo",
            Self::Tags => "tags",
            Self::AttachCard(_) => "attachCard",
            Self::TagCards(_) => "tagCards",
            Self::SelectCard(_) => "selectCard",
            Self::CardStatus(_) => "cardStatus",
            Self::Cards => "cards",
            Self::Selected => "selected",
            Self::NewCards(..) => "newCards",
            Self::HoverCard(_) => "hoverCard",
        }
    }

    /// Positional wire arguments.
    #[must_use]
    pub fn args(&self) -> Vec<Value> {
        match self {
            Self::GetIdToken | Self::GetBoardInfo | Self::Tags | Self::Cards | Self::Selected => Vec::new(),
            Self::SetBoardName(name) => vec![Value::String(name.clone())],
            Self::SelectCard(link) | Self::HoverCard(link) => vec![Value::String(link.clone())],
            Self::AttachCard(card) => vec![json(card)],
            Self::TagCards(args) => vec![json(args)],
            Self::CardStatus(args) => vec![json(args)],
            Self::NewCards(cards, options) => {
                let mut out = vec![json(cards)];
                if let Some(options) = options {
                    out.push(json(options));
                }
                out
            }
        }
    }

    /// Parse a wire `name` and `data` array.
    ///
    /// # Errors
    ///
    /// Returns [`QueryParseError::UnknownQuery`] for an unrecognised name and
    /// [`QueryParseError::InvalidArgs`] when arguments do not match.
    pub fn parse(name: &str, data: Vec<Value>) -> Result<Self, QueryParseError> {
        let mut args = data.into_iter();
        let query = match name {
            "getIdToken" => Self::GetIdToken,
            "setBoardName" => Self::SetBoardName(arg("setBoardName", args.next())?),
            "getBoardInfo" => Self::GetBoardInfo,
            "tags" => Self::Tags,
            "attachCard" => Self::AttachCard(arg("attachCard", args.next())?),
            "tagCards" => Self::TagCards(arg("tagCards", args.next())?),
            "selectCard" => Self::SelectCard(arg("selectCard", args.next())?),
            "cardStatus" => Self::CardStatus(arg("cardStatus", args.next())?),
            "cards" => Self::Cards,
            "selected" => Self::Selected,
            "newCards" => {
                let cards = arg("newCards", args.next())?;
                let options = match args.next() {
                    None | Some(Value::Null) => None,
                    Some(v) => Some(arg("newCards", Some(v))?),
                };
                Self::NewCards(cards, options)
            }
            "hoverCard" => Self::HoverCard(arg("hoverCard", args.next())?),
            other => return Err(QueryParseError::UnknownQuery(other.to_owned())),
        };
        Ok(query)
    }
}

fn arg<T: DeserializeOwned>(name: &'static str, value: Option<Value>) -> Result<T, QueryParseError> {
    let Some(value) = value else {
        return Err(QueryParseError::InvalidArgs { name, message: "missing argument".into() });
    };
    serde_json::from_value(value).map_err(|e| QueryParseError::InvalidArgs { name, message: e.to_string() })
}

/// Serializing these plain data types cannot fail.
fn json<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

#[cfg(test)]
#[path = "query_test.rs"]
mod tests;
