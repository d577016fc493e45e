//! Event taxonomy for streamed assistant turns.
//!
//! The wire carries a free-form `type` string. At the decoder boundary it is
//! mapped onto the closed [`EventType`] set; everything outside that set, or
//! a known type whose fields don't fit, becomes [`Event::Unknown`] with an
//! [`UnknownCode`] instead of an error. Adding a wire type means adding a
//! variant here, and every `match` on [`Event`] has to handle it.

use serde::Serialize;
use serde_json::Value;

use crate::cart::CartChunk;
use crate::form::TextForm;
use crate::shopping::{RetailerOffers, ShoppingList};
use crate::tree::{CategoryTree, TreeKind};

/// Every wire discriminant the decoder understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    Text,
    Thinking,
    Tool,
    ToolResult,
    Answer,
    Error,
    TextForm,
    PeopleTree,
    PlaceTree,
    Tree,
    Cart,
    Items,
    RetailerOffers,
}

impl EventType {
    pub const ALL: [EventType; 13] = [
        EventType::Text,
        EventType::Thinking,
        EventType::Tool,
        EventType::ToolResult,
        EventType::Answer,
        EventType::Error,
        EventType::TextForm,
        EventType::PeopleTree,
        EventType::PlaceTree,
        EventType::Tree,
        EventType::Cart,
        EventType::Items,
        EventType::RetailerOffers,
    ];

    /// Exact, case-sensitive match on the wire discriminant.
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == value)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Thinking => "thinking",
            Self::Tool => "tool",
            Self::ToolResult => "tool_result",
            Self::Answer => "answer",
            Self::Error => "error",
            Self::TextForm => "text_form",
            Self::PeopleTree => "people_tree",
            Self::PlaceTree => "place_tree",
            Self::Tree => "tree",
            Self::Cart => "cart",
            Self::Items => "items",
            Self::RetailerOffers => "retailer_offers",
        }
    }

    /// Tree kind for the tree-family discriminants.
    pub fn tree_kind(&self) -> Option<TreeKind> {
        match self {
            Self::PeopleTree => Some(TreeKind::People),
            Self::PlaceTree => Some(TreeKind::Place),
            Self::Tree => Some(TreeKind::Generic),
            _ => None,
        }
    }
}

/// Why a payload decoded to [`Event::Unknown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownCode {
    /// No string `type` field.
    MissingType,
    /// A `type` outside the known set.
    UnrecognizedType,
    /// A known `type` whose fields are missing or mistyped.
    SchemaViolation,
}

impl UnknownCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingType => "missing_type",
            Self::UnrecognizedType => "unrecognized_type",
            Self::SchemaViolation => "schema_violation",
        }
    }
}

/// One decoded stream event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Incremental answer text.
    Text { content: String },
    /// Model reasoning, kept apart from the answer text.
    Thinking { content: String },
    /// A tool started executing.
    Tool {
        name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        arguments: Option<Value>,
    },
    /// A tool finished.
    ToolResult {
        name: String,
        result: String,
        success: bool,
    },
    /// The agent's complete answer; text was already streamed.
    Answer {
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        metadata: Option<Value>,
    },
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },
    TextForm(TextForm),
    /// Any tree-family event; the kind travels inside the tree.
    Tree(CategoryTree),
    Cart(CartChunk),
    Items(ShoppingList),
    RetailerOffers(RetailerOffers),
    Unknown {
        #[serde(skip_serializing_if = "Option::is_none")]
        event_type: Option<String>,
        code: UnknownCode,
        #[serde(skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
        payload: Value,
    },
}

impl Event {
    /// Wire discriminant, or `"unknown"` for the fallback variant.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Text { .. } => EventType::Text.as_str(),
            Self::Thinking { .. } => EventType::Thinking.as_str(),
            Self::Tool { .. } => EventType::Tool.as_str(),
            Self::ToolResult { .. } => EventType::ToolResult.as_str(),
            Self::Answer { .. } => EventType::Answer.as_str(),
            Self::Error { .. } => EventType::Error.as_str(),
            Self::TextForm(_) => EventType::TextForm.as_str(),
            Self::Tree(tree) => tree.kind.event_type(),
            Self::Cart(_) => EventType::Cart.as_str(),
            Self::Items(_) => EventType::Items.as_str(),
            Self::RetailerOffers(_) => EventType::RetailerOffers.as_str(),
            Self::Unknown { .. } => "unknown",
        }
    }

    /// `answer` and `error` are the producer's terminal signals.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Answer { .. } | Self::Error { .. })
    }

    pub fn text(content: impl Into<String>) -> Self {
        Self::Text {
            content: content.into(),
        }
    }
}
