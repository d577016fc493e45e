//! # turnstream-events: from raw bytes to decoded events
//!
//! - [`frame`] splits arbitrary byte chunks into `data: ` payload strings.
//! - [`mod@decode`] maps each payload onto the closed [`turnstream_protocol::Event`] set.
//! - [`stream`] wires both behind a [`turnstream_protocol::ChunkSource`].

pub mod decode;
pub mod frame;
pub mod stream;

pub use decode::{decode, decode_value};
pub use frame::{DATA_PREFIX, FrameDecoder};
pub use stream::{
    DEFAULT_CHUNK_SIZE, Decoded, ReaderSource, StreamSource, decode_payload, event_stream,
};
