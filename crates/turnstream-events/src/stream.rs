//! Chunk sources and the async event stream built on top of them.

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, warn};

use turnstream_protocol::{ChunkSource, DecodeError, Event, TransportError};

use crate::decode::decode;
use crate::frame::FrameDecoder;

/// Default read size for [`ReaderSource`].
pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024;

/// Adapts any stream of byte chunks (an HTTP body, a channel) to [`ChunkSource`].
pub struct StreamSource<S> {
    inner: S,
}

impl<S> StreamSource<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

#[async_trait]
impl<S, B> ChunkSource for StreamSource<S>
where
    S: Stream<Item = Result<B, TransportError>> + Send + Unpin,
    B: AsRef<[u8]> + Send,
{
    async fn next_chunk(&mut self) -> Option<Result<Vec<u8>, TransportError>> {
        let item = self.inner.next().await?;
        Some(item.map(|chunk| chunk.as_ref().to_vec()))
    }
}

/// Reads fixed-size chunks from an [`AsyncRead`] (a file, stdin, a socket).
pub struct ReaderSource<R> {
    reader: R,
    buffer: Vec<u8>,
}

impl<R> ReaderSource<R> {
    pub fn new(reader: R) -> Self {
        Self::with_chunk_size(reader, DEFAULT_CHUNK_SIZE)
    }

    /// Zero is bumped to one byte so every read makes progress.
    pub fn with_chunk_size(reader: R, chunk_size: usize) -> Self {
        Self {
            reader,
            buffer: vec![0; chunk_size.max(1)],
        }
    }
}

#[async_trait]
impl<R> ChunkSource for ReaderSource<R>
where
    R: AsyncRead + Send + Unpin,
{
    async fn next_chunk(&mut self) -> Option<Result<Vec<u8>, TransportError>> {
        match self.reader.read(&mut self.buffer).await {
            Ok(0) => None,
            Ok(read) => Some(Ok(self.buffer[..read].to_vec())),
            Err(error) => Some(Err(TransportError::from(error))),
        }
    }
}

/// Outcome of decoding one framed payload.
#[derive(Debug)]
pub enum Decoded {
    Event(Event),
    /// Malformed or non-object payload; already logged.
    Dropped { payload: String, error: DecodeError },
}

impl Decoded {
    pub fn into_event(self) -> Option<Event> {
        match self {
            Self::Event(event) => Some(event),
            Self::Dropped { .. } => None,
        }
    }
}

/// Frame and decode one payload line.
pub fn decode_payload(payload: String) -> Decoded {
    match decode(&payload) {
        Ok(event) => Decoded::Event(event),
        Err(error) => {
            warn!(%error, bytes = payload.len(), "dropping undecodable payload");
            Decoded::Dropped { payload, error }
        }
    }
}

/// Turn a chunk source into a stream of decoded payloads in arrival order.
///
/// Ends after the source's clean end (flushing an unterminated last line)
/// or right after yielding the source's first error. A partial line pending
/// at a transport error is discarded.
pub fn event_stream<S>(mut source: S) -> impl Stream<Item = Result<Decoded, TransportError>> + Send
where
    S: ChunkSource,
{
    async_stream::stream! {
        let mut frames = FrameDecoder::new();
        loop {
            match source.next_chunk().await {
                Some(Ok(chunk)) => {
                    for payload in frames.feed(&chunk) {
                        yield Ok(decode_payload(payload));
                    }
                }
                Some(Err(error)) => {
                    if frames.has_pending() {
                        debug!("discarding partial line at transport failure");
                    }
                    yield Err(error);
                    break;
                }
                None => {
                    if let Some(payload) = frames.finish() {
                        yield Ok(decode_payload(payload));
                    }
                    break;
                }
            }
        }
    }
}
