//! Request-forwarding dispatch.
//!
//! Turns one inbound proxied request into exactly one correlated reply
//! frame (long-link non-init, short-link) or into a side-channel the
//! transport drives itself (socket sessions, long-link init). A failure
//! here never tears the action stream down; the peer's correlation times
//! out on its own side.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use imlink_core::error::{LinkError, LinkResult};
use imlink_core::frames::{ProxyRequest, ReplyBody, SocketRequest};
use imlink_core::transport::{
    BoxFuture, LongLink, ReplyWriter, ShortLink, SocketConnector, SocketHandler, SocketSession,
};

use crate::mux::ProxyForwarder;

type SocketMap = Arc<Mutex<HashMap<u32, Box<dyn SocketSession>>>>;

/// Routes inbound proxied requests to the matching network transport.
pub struct ForwardDispatch {
    replies: Arc<dyn ReplyWriter>,
    long_link: Arc<dyn LongLink>,
    short_links: Arc<dyn ShortLink>,
    sockets: Arc<dyn SocketConnector>,
    /// Streaming socket sessions, scoped by inbound correlation id.
    active: SocketMap,
}

impl ForwardDispatch {
    pub fn new(
        replies: Arc<dyn ReplyWriter>,
        long_link: Arc<dyn LongLink>,
        short_links: Arc<dyn ShortLink>,
        sockets: Arc<dyn SocketConnector>,
    ) -> Self {
        Self {
            replies,
            long_link,
            short_links,
            sockets,
            active: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Number of live proxied socket sessions.
    pub async fn active_sockets(&self) -> usize {
        self.active.lock().await.len()
    }

    async fn forward_inner(&self, request: ProxyRequest, ack: u32) -> LinkResult<()> {
        match request {
            ProxyRequest::LongLink(req) if req.init => {
                tracing::debug!(ack, "long link init handed to transport");
                self.long_link
                    .send_init(&req.payload, self.replies.clone(), ack)
                    .await
            }
            ProxyRequest::LongLink(req) => {
                let response = self.long_link.send(req.seq, &req.payload).await?;
                self.replies.reply(
                    ack,
                    ReplyBody::LongLink {
                        seq: req.seq,
                        payload: response,
                    },
                )
            }
            ProxyRequest::ShortLink(req) => {
                tracing::debug!(ack, host = %req.host, port = req.port, path = %req.path, "short link round trip");
                let response = self
                    .short_links
                    .request(&req.host, req.port, &req.path, &req.payload)
                    .await?;
                self.replies
                    .reply(ack, ReplyBody::ShortLink { payload: response })
            }
            ProxyRequest::Socket(req) => self.forward_socket(req, ack).await,
        }
    }

    /// Opens (or reuses) the socket session scoped to `ack` and pushes the
    /// payload through it. Inbound chunks stream back as reply frames via
    /// [`SocketReplyHandler`]; there is no single awaited response.
    async fn forward_socket(&self, req: SocketRequest, ack: u32) -> LinkResult<()> {
        let mut active = self.active.lock().await;
        let session = match active.entry(ack) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => {
                tracing::debug!(ack, host = %req.host, "opening proxied socket session");
                let handler = SocketReplyHandler {
                    replies: self.replies.clone(),
                    active: self.active.clone(),
                    ack,
                };
                let session = self.sockets.open(&req.host, Box::new(handler)).await?;
                e.insert(session)
            }
        };
        session.send(&req.payload).await
    }
}

impl ProxyForwarder for ForwardDispatch {
    fn forward(&self, request: ProxyRequest, ack: u32) -> BoxFuture<'_, LinkResult<()>> {
        Box::pin(async move {
            self.forward_inner(request, ack).await.map_err(|e| match e {
                e @ LinkError::Forwarding(_) => e,
                other => LinkError::Forwarding(other.to_string()),
            })
        })
    }
}

/// Streams everything a proxied socket receives back as reply frames
/// correlated to the originating request.
struct SocketReplyHandler {
    replies: Arc<dyn ReplyWriter>,
    active: SocketMap,
    ack: u32,
}

impl SocketHandler for SocketReplyHandler {
    fn on_receive(&mut self, chunk: &[u8]) -> bool {
        if let Err(e) = self.replies.reply(
            self.ack,
            ReplyBody::Socket {
                payload: chunk.to_vec(),
            },
        ) {
            tracing::debug!(ack = self.ack, error = %e, "socket reply dropped");
        }
        true
    }

    fn on_disconnect(&mut self) {
        tracing::debug!(ack = self.ack, "proxied socket session closed");
        let active = self.active.clone();
        let ack = self.ack;
        tokio::spawn(async move {
            active.lock().await.remove(&ack);
        });
    }
}
