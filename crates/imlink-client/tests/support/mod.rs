//! Shared test doubles: a channel-backed action transport plus scripted
//! network transports.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use imlink_client::mux::{ProxyForwarder, StreamMeta};
use imlink_core::error::{LinkError, LinkResult};
use imlink_core::frames::{Frame, ProxyRequest, ReplyBody};
use imlink_core::transport::{
    ActionTransport, BoxFuture, LongLink, ReplyWriter, ShortLink, SocketConnector, SocketHandler,
    SocketSession,
};

pub fn meta() -> StreamMeta {
    StreamMeta {
        trace_id: "trace-1".into(),
        client_type: "test".into(),
        client_version: "0.0.1".into(),
        long_link_id: None,
    }
}

/// Peer-side signals injected into the transport.
pub enum PeerSignal {
    Frame(Frame),
    Error(String),
    End,
}

/// In-memory duplex stream: the test plays the control-plane peer.
pub struct ChannelTransport {
    incoming: mpsc::UnboundedReceiver<PeerSignal>,
    written: mpsc::UnboundedSender<Frame>,
    cancelled: Arc<AtomicUsize>,
    finished: Arc<AtomicUsize>,
}

pub struct PeerHarness {
    pub signals: mpsc::UnboundedSender<PeerSignal>,
    pub written: mpsc::UnboundedReceiver<Frame>,
    pub cancelled: Arc<AtomicUsize>,
    pub finished: Arc<AtomicUsize>,
}

pub fn channel_transport() -> (ChannelTransport, PeerHarness) {
    let (signal_tx, signal_rx) = mpsc::unbounded_channel();
    let (written_tx, written_rx) = mpsc::unbounded_channel();
    let cancelled = Arc::new(AtomicUsize::new(0));
    let finished = Arc::new(AtomicUsize::new(0));
    (
        ChannelTransport {
            incoming: signal_rx,
            written: written_tx,
            cancelled: cancelled.clone(),
            finished: finished.clone(),
        },
        PeerHarness {
            signals: signal_tx,
            written: written_rx,
            cancelled,
            finished,
        },
    )
}

impl ActionTransport for ChannelTransport {
    fn write(&mut self, frame: Frame) -> BoxFuture<'_, LinkResult<()>> {
        Box::pin(async move {
            self.written
                .send(frame)
                .map_err(|_| LinkError::Transport("peer harness dropped".into()))
        })
    }

    fn next(&mut self) -> BoxFuture<'_, Option<LinkResult<Frame>>> {
        Box::pin(async move {
            match self.incoming.recv().await {
                Some(PeerSignal::Frame(f)) => Some(Ok(f)),
                Some(PeerSignal::Error(e)) => Some(Err(LinkError::Transport(e))),
                Some(PeerSignal::End) | None => None,
            }
        })
    }

    fn cancel(&mut self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.cancelled.fetch_add(1, Ordering::SeqCst);
        })
    }

    fn finish(&mut self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.finished.fetch_add(1, Ordering::SeqCst);
        })
    }
}

/// Forwarder that ignores everything; for tests that never inject proxied
/// requests.
pub struct NullForwarder;

impl ProxyForwarder for NullForwarder {
    fn forward(&self, _request: ProxyRequest, _ack: u32) -> BoxFuture<'_, LinkResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

/// Long link that answers `send` with the payload suffixed by `-ll` and
/// answers `send_init` by writing a reply itself.
#[derive(Default)]
pub struct EchoLongLink {
    pub init_calls: Mutex<Vec<(Vec<u8>, u32)>>,
}

impl LongLink for EchoLongLink {
    fn send<'a>(&'a self, _seq: u32, payload: &'a [u8]) -> BoxFuture<'a, LinkResult<Vec<u8>>> {
        Box::pin(async move { Ok([payload, b"-ll".as_slice()].concat()) })
    }

    fn send_init<'a>(
        &'a self,
        payload: &'a [u8],
        replies: Arc<dyn ReplyWriter>,
        ack: u32,
    ) -> BoxFuture<'a, LinkResult<()>> {
        Box::pin(async move {
            self.init_calls.lock().unwrap().push((payload.to_vec(), ack));
            replies.reply(
                ack,
                ReplyBody::LongLink {
                    seq: 0,
                    payload: b"init-ok".to_vec(),
                },
            )
        })
    }
}

/// Short link that answers with `"{path}:{payload}"`, or fails for the host
/// `"unreachable"`.
pub struct EchoShortLink;

impl ShortLink for EchoShortLink {
    fn request<'a>(
        &'a self,
        host: &'a str,
        _port: u16,
        path: &'a str,
        payload: &'a [u8],
    ) -> BoxFuture<'a, LinkResult<Vec<u8>>> {
        Box::pin(async move {
            if host == "unreachable" {
                return Err(LinkError::Transport("connect refused".into()));
            }
            let mut out = path.as_bytes().to_vec();
            out.push(b':');
            out.extend_from_slice(payload);
            Ok(out)
        })
    }
}

/// Connector that captures every opened handler and records sends.
#[derive(Default)]
pub struct CapturingSockets {
    pub opened: AtomicUsize,
    pub handlers: Arc<Mutex<Vec<Box<dyn SocketHandler>>>>,
    pub sent: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl SocketConnector for CapturingSockets {
    fn open<'a>(
        &'a self,
        _host: &'a str,
        handler: Box<dyn SocketHandler>,
    ) -> BoxFuture<'a, LinkResult<Box<dyn SocketSession>>> {
        Box::pin(async move {
            self.opened.fetch_add(1, Ordering::SeqCst);
            let mut handler = handler;
            handler.on_connect();
            self.handlers.lock().unwrap().push(handler);
            Ok(Box::new(RecordingSession {
                sent: self.sent.clone(),
            }) as Box<dyn SocketSession>)
        })
    }
}

pub struct RecordingSession {
    sent: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl SocketSession for RecordingSession {
    fn send<'a>(&'a mut self, payload: &'a [u8]) -> BoxFuture<'a, LinkResult<()>> {
        Box::pin(async move {
            self.sent.lock().unwrap().push(payload.to_vec());
            Ok(())
        })
    }

    fn close(&mut self) -> BoxFuture<'_, LinkResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Await the next frame the multiplexer wrote, with a hang guard.
pub async fn recv_written(peer: &mut PeerHarness) -> Frame {
    tokio::time::timeout(std::time::Duration::from_secs(5), peer.written.recv())
        .await
        .expect("no frame written within 5s")
        .expect("transport dropped")
}

/// Poll `probe` until it holds, or fail the test.
pub async fn eventually(mut probe: impl FnMut() -> bool, what: &str) {
    for _ in 0..500 {
        if probe() {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    }
    panic!("condition never held: {what}");
}
