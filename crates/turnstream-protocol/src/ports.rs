//! Runtime boundary port for the transport collaborator.
//!
//! The engine never opens connections itself. Whatever holds the long-lived
//! response (an HTTP body, a socket, a captured file) implements
//! [`ChunkSource`] and hands over raw byte chunks in arrival order. Chunk
//! boundaries carry no meaning: they may split lines and multi-byte
//! characters anywhere.
//!
//! Object-safety note: the trait uses `async-trait` so sources can be boxed.

use async_trait::async_trait;

use crate::error::TransportError;

#[async_trait]
pub trait ChunkSource: Send {
    /// Next chunk, `None` at a clean end of stream.
    ///
    /// After an `Err` the caller stops polling; the turn closes as failed.
    async fn next_chunk(&mut self) -> Option<Result<Vec<u8>, TransportError>>;
}

#[async_trait]
impl<S> ChunkSource for Box<S>
where
    S: ChunkSource + ?Sized,
{
    async fn next_chunk(&mut self) -> Option<Result<Vec<u8>, TransportError>> {
        (**self).next_chunk().await
    }
}
