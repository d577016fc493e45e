//! # turnstream-protocol: wire contract for streamed assistant turns
//!
//! Shared types for the client side of a server-pushed agent event stream:
//! the event taxonomy, the snapshot models the events carry, and the port a
//! transport implements to feed bytes in.
//!
//! It has no runtime dependencies (no tokio) so UI layers can depend on it
//! for the data model alone.
//!
//! ## Module Overview
//!
//! - [`ids`]: ConversationId, TurnId
//! - [`event`]: Event (closed variant set + `Unknown` fallback), EventType
//! - [`tree`]: Category, CategoryTree, TreeSet, truthy selection flags
//! - [`cart`]: CartItem normalization, RecommendedItem, CartChunk
//! - [`form`]: TextForm
//! - [`shopping`]: ShoppingList, RetailerOffers
//! - [`tool`]: ToolCall lifecycle
//! - [`ports`]: ChunkSource (transport boundary)
//! - [`error`]: DecodeError, CartItemError, TurnError, TransportError

pub mod cart;
pub mod error;
pub mod event;
pub mod form;
pub mod ids;
pub mod ports;
pub mod shopping;
pub mod tool;
pub mod tree;

pub use cart::{CartChunk, CartItem, Pick, RecommendedItem};
pub use error::{CartItemError, DecodeError, DecodeResult, TransportError, TurnError};
pub use event::{Event, EventType, UnknownCode};
pub use form::{TextField, TextForm};
pub use ids::{ConversationId, SeqNo, TurnId};
pub use ports::ChunkSource;
pub use shopping::{OfferPhase, RetailerOffer, RetailerOffers, ShoppingList, ShoppingListEntry};
pub use tool::{ToolCall, ToolStatus};
pub use tree::{CONTRACT_DEPTH, Category, CategoryTree, TreeKind, TreeSet, is_truthy};
