//! Card model shared by the board channel, the store, and the editor channel.
//!
//! DESIGN
//! ======
//! Cards cross the wire in the board's own JSON shape (camelCase, tagged by
//! `type`), so the Rust types serialize to exactly what the board sends.
//! A card is identified inside its board by [`Card::key`]: the `miroLink`
//! once the board has placed it, otherwise a local key built from its path.

use serde::{Deserialize, Serialize};

// =============================================================================
// CARD
// =============================================================================

/// Whether a card currently resolves to a location in the workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardStatus {
    Connected,
    Disconnected,
}

/// A card that points at one symbol in a source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolCard {
    pub board_id: String,
    pub title: String,
    pub path: String,
    pub symbol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub miro_link: Option<String>,
    #[serde(default)]
    pub code_link: Option<String>,
    pub status: CardStatus,
}

/// A card that groups other cards under a path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupCard {
    pub board_id: String,
    pub title: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub miro_link: Option<String>,
    pub status: CardStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Card {
    Symbol(SymbolCard),
    Group(GroupCard),
}

impl Card {
    #[must_use]
    pub fn board_id(&self) -> &str {
        match self {
            Self::Symbol(c) => &c.board_id,
            Self::Group(c) => &c.board_id,
        }
    }

    #[must_use]
    pub fn title(&self) -> &str {
        match self {
            Self::Symbol(c) => &c.title,
            Self::Group(c) => &c.title,
        }
    }

    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            Self::Symbol(c) => &c.path,
            Self::Group(c) => &c.path,
        }
    }

    #[must_use]
    pub fn miro_link(&self) -> Option<&str> {
        match self {
            Self::Symbol(c) => c.miro_link.as_deref(),
            Self::Group(c) => c.miro_link.as_deref(),
        }
    }

    #[must_use]
    pub fn status(&self) -> CardStatus {
        match self {
            Self::Symbol(c) => c.status,
            Self::Group(c) => c.status,
        }
    }

    /// Board-scoped identity: the board link when placed, otherwise
    /// `path#symbol` for symbol cards and `path#title` for groups.
    #[must_use]
    pub fn key(&self) -> String {
        if let Some(link) = self.miro_link() {
            return link.to_owned();
        }
        match self {
            Self::Symbol(c) => format!("{}#{}", c.path, c.symbol),
            Self::Group(c) => format!("{}#{}", c.path, c.title),
        }
    }

    pub fn set_board_id(&mut self, board_id: impl Into<String>) {
        let board_id = board_id.into();
        match self {
            Self::Symbol(c) => c.board_id = board_id,
            Self::Group(c) => c.board_id = board_id,
        }
    }

    pub fn set_status(&mut self, status: CardStatus) {
        match self {
            Self::Symbol(c) => c.status = status,
            Self::Group(c) => c.status = status,
        }
    }

    /// Group cards carry no code link; the update is ignored for them.
    pub fn set_code_link(&mut self, code_link: Option<String>) {
        if let Self::Symbol(c) = self {
            c.code_link = code_link;
        }
    }
}

// =============================================================================
// TAGS
// =============================================================================

/// The board's fixed tag palette.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagColor {
    Red,
    Magenta,
    Violet,
    LightGreen,
    Green,
    DarkGreen,
    Cyan,
    Blue,
    DarkBlue,
    Yellow,
    Gray,
    Black,
}

impl TagColor {
    pub const ALL: [TagColor; 12] = [
        Self::Red,
        Self::Magenta,
        Self::Violet,
        Self::LightGreen,
        Self::Green,
        Self::DarkGreen,
        Self::Cyan,
        Self::Blue,
        Self::DarkBlue,
        Self::Yellow,
        Self::Gray,
        Self::Black,
    ];
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: String,
    pub title: String,
    pub color: TagColor,
}

/// Tag argument of `tagCards`: an existing tag id, or a tag to create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagRef {
    Existing(String),
    New { color: TagColor, title: String },
}

// =============================================================================
// BOARD INFO
// =============================================================================

/// Reply shape of the board's `getBoardInfo` query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardIdentity {
    pub board_id: String,
    pub name: String,
}

/// Board summary carried by the `connect` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardInfo {
    pub id: String,
    pub name: String,
}

#[cfg(test)]
#[path = "card_test.rs"]
mod tests;
