//! Seams for the injected transports.
//!
//! The concrete network code (the authenticated duplex stream, the
//! persistent long link, one-shot short links, and raw socket sessions) is
//! supplied by the embedding application. These traits are object-safe
//! (boxed futures rather than `async fn`) so implementations can be handed
//! across the dispatch as trait objects.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::LinkResult;
use crate::frames::{Frame, ReplyBody};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The authenticated duplex stream carrying action frames.
///
/// The multiplexer owns exactly one of these and reacts to three inbound
/// signals: `Some(Ok(frame))` is data, `Some(Err(e))` is a stream error,
/// `None` is end-of-stream from the peer.
pub trait ActionTransport: Send + 'static {
    /// Write one frame. Ordered and reliable at the byte level.
    fn write(&mut self, frame: Frame) -> BoxFuture<'_, LinkResult<()>>;

    /// Next inbound signal.
    fn next(&mut self) -> BoxFuture<'_, Option<LinkResult<Frame>>>;

    /// Abort the stream (local error teardown).
    fn cancel(&mut self) -> BoxFuture<'_, ()>;

    /// Gracefully end the write side.
    fn finish(&mut self) -> BoxFuture<'_, ()>;
}

/// Sink through which transports emit correlated reply frames without
/// owning the multiplexer.
pub trait ReplyWriter: Send + Sync {
    fn reply(&self, ack: u32, body: ReplyBody) -> LinkResult<()>;
}

/// The persistent, session-scoped connection to the provider edge. One
/// shared instance serves many logical requests.
pub trait LongLink: Send + Sync {
    /// Send one logical request keyed by the long-link session's own
    /// sequence number and await its single response.
    fn send<'a>(&'a self, seq: u32, payload: &'a [u8]) -> BoxFuture<'a, LinkResult<Vec<u8>>>;

    /// Hand initialization data to the transport. Replies correlated to
    /// `ack` are the transport's responsibility, written through `replies`.
    fn send_init<'a>(
        &'a self,
        payload: &'a [u8],
        replies: Arc<dyn ReplyWriter>,
        ack: u32,
    ) -> BoxFuture<'a, LinkResult<()>>;
}

/// One-shot connection: opened per request, closed after its single
/// response.
pub trait ShortLink: Send + Sync {
    fn request<'a>(
        &'a self,
        host: &'a str,
        port: u16,
        path: &'a str,
        payload: &'a [u8],
    ) -> BoxFuture<'a, LinkResult<Vec<u8>>>;
}

/// Receives the lifecycle of one raw socket session.
pub trait SocketHandler: Send {
    /// The connection is established.
    fn on_connect(&mut self) {}

    /// One inbound byte chunk. Return `true` when the chunk was consumed.
    fn on_receive(&mut self, chunk: &[u8]) -> bool;

    /// The connection closed.
    fn on_disconnect(&mut self) {}
}

/// A raw socket session whose request/response pattern is not strictly
/// one-shot; inbound data streams through the [`SocketHandler`].
pub trait SocketSession: Send {
    fn send<'a>(&'a mut self, payload: &'a [u8]) -> BoxFuture<'a, LinkResult<()>>;

    fn close(&mut self) -> BoxFuture<'_, LinkResult<()>>;
}

/// Opens raw socket sessions.
pub trait SocketConnector: Send + Sync {
    fn open<'a>(
        &'a self,
        host: &'a str,
        handler: Box<dyn SocketHandler>,
    ) -> BoxFuture<'a, LinkResult<Box<dyn SocketSession>>>;
}

/// One application-level frame reconstructed from a raw response stream.
/// Opaque except for the result code and named fields.
pub trait ResponseFrame: Send {
    fn status(&self) -> i32;

    fn field(&self, name: &str) -> Option<&[u8]>;
}

/// Reassembles application-level frames from raw bytes. Fed chunk by chunk;
/// yields zero or more complete frames per chunk.
pub trait ResponseDecoder: Send {
    type Frame: ResponseFrame;

    /// Drop any partially buffered frame.
    fn reset(&mut self);

    /// Feed one chunk; return every frame completed by it.
    fn update(&mut self, chunk: &[u8]) -> LinkResult<Vec<Self::Frame>>;
}
