//! The accumulated state of one turn.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

use turnstream_protocol::{
    CartChunk, ConversationId, RetailerOffers, SeqNo, ShoppingList, TextForm, ToolCall, TreeSet,
    TurnId,
};

/// What the producer sent as its terminal `answer`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnswerSummary {
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationKind {
    /// Producer-reported `error` event.
    Error,
    /// A payload that decoded to `unknown`.
    Unknown,
    /// Recommended items that failed to decode in the current cart.
    PartialCart,
    /// The transport ended the turn with an error.
    Transport,
}

/// A user-visible error scoped to the turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Annotation {
    pub kind: AnnotationKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Arrival number of the payload that raised it.
    pub sequence: SeqNo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CloseReason {
    EndOfStream,
    TransportFailed { message: String },
    Cancelled,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EndOfStream => "end_of_stream",
            Self::TransportFailed { .. } => "transport_failed",
            Self::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TurnStatus {
    Open,
    Closed { reason: CloseReason },
}

/// Everything the stream has told us about one turn so far.
///
/// Snapshot fields (`form`, `trees`, `cart`, `items`, `offers`) always hold
/// the latest complete value; `text` and `thinking` are concatenations.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Turn {
    pub id: TurnId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<ConversationId>,
    pub prompt: String,
    pub opened_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
    pub text: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub thinking: String,
    /// Keyed by tool name, in first-seen order.
    pub tools: IndexMap<String, ToolCall>,
    pub trees: TreeSet,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub form: Option<TextForm>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cart: Option<CartChunk>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<ShoppingList>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offers: Option<RetailerOffers>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<AnswerSummary>,
    pub annotations: Vec<Annotation>,
    /// Payloads that could not be parsed at all.
    pub dropped_payloads: usize,
    pub status: TurnStatus,
}

impl Turn {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            id: TurnId::default(),
            conversation_id: None,
            prompt: prompt.into(),
            opened_at: Utc::now(),
            closed_at: None,
            text: String::new(),
            thinking: String::new(),
            tools: IndexMap::new(),
            trees: TreeSet::default(),
            form: None,
            cart: None,
            items: None,
            offers: None,
            answer: None,
            annotations: Vec::new(),
            dropped_payloads: 0,
            status: TurnStatus::Open,
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.status, TurnStatus::Closed { .. })
    }

    pub fn close_reason(&self) -> Option<&CloseReason> {
        match &self.status {
            TurnStatus::Open => None,
            TurnStatus::Closed { reason } => Some(reason),
        }
    }

    /// Streamed text, falling back to the answer body when nothing streamed.
    pub fn display_text(&self) -> &str {
        if self.text.is_empty()
            && let Some(answer) = &self.answer
        {
            return &answer.content;
        }
        &self.text
    }

    /// The producer sent its terminal signal (`answer` or `error`).
    ///
    /// A closed turn without one is partial, which is still a valid result.
    pub fn is_complete(&self) -> bool {
        self.answer.is_some() || self.terminal_error().is_some()
    }

    pub fn terminal_error(&self) -> Option<&Annotation> {
        self.annotations
            .iter()
            .find(|annotation| annotation.kind == AnnotationKind::Error)
    }

    pub fn annotations_of(&self, kind: AnnotationKind) -> impl Iterator<Item = &Annotation> {
        self.annotations
            .iter()
            .filter(move |annotation| annotation.kind == kind)
    }
}
