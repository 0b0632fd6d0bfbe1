//! Raw-socket file download: frame assembly and decryption.
//!
//! This path never touches the action-stream multiplexer. It is one
//! self-contained socket round trip with its own timing instrumentation.

use std::time::Instant;

use tokio::sync::mpsc;

use imlink_core::error::{DownloadError, LinkError, LinkResult};
use imlink_core::transport::{ResponseDecoder, ResponseFrame, SocketConnector, SocketHandler};

use super::cipher::{decrypt_asset, KEY_LEN};

/// Everything needed for one download round trip. The symmetric key is the
/// one the asset was declared with at upload time.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DownloadRequest {
    pub host: String,
    pub payload: Vec<u8>,
    pub key: [u8; KEY_LEN],
    /// Name of the encrypted file-data field inside the response frame.
    pub field: String,
}

enum DownloadEvent<F> {
    Frame(F),
    Failed(LinkError),
    Closed,
}

/// Feeds the decoder until it yields its first complete frame, then stops
/// consuming.
struct DownloadHandler<D: ResponseDecoder> {
    decoder: D,
    events: mpsc::UnboundedSender<DownloadEvent<D::Frame>>,
    done: bool,
}

impl<D> SocketHandler for DownloadHandler<D>
where
    D: ResponseDecoder + 'static,
    D::Frame: 'static,
{
    fn on_connect(&mut self) {
        // A reconnect must not inherit half a frame.
        self.decoder.reset();
    }

    fn on_receive(&mut self, chunk: &[u8]) -> bool {
        if self.done {
            return false;
        }
        match self.decoder.update(chunk) {
            Ok(mut frames) => {
                if !frames.is_empty() {
                    self.done = true;
                    let _ = self.events.send(DownloadEvent::Frame(frames.remove(0)));
                }
                true
            }
            Err(e) => {
                self.done = true;
                let _ = self.events.send(DownloadEvent::Failed(e));
                false
            }
        }
    }

    fn on_disconnect(&mut self) {
        let _ = self.events.send(DownloadEvent::Closed);
    }
}

/// Fetch and decrypt one file.
///
/// Opens a socket session to the declared host, sends the request payload,
/// and waits for the decoder to assemble the first response frame. Fails
/// with `Download(NoResponse)` when the stream ends first and with
/// `Download(Status(code))` when the frame's result code is non-zero.
pub async fn download_file<D>(
    sockets: &dyn SocketConnector,
    decoder: D,
    request: &DownloadRequest,
) -> LinkResult<Vec<u8>>
where
    D: ResponseDecoder + 'static,
    D::Frame: 'static,
{
    let started = Instant::now();
    let (events_tx, mut events) = mpsc::unbounded_channel();
    let handler = DownloadHandler {
        decoder,
        events: events_tx,
        done: false,
    };

    let mut session = sockets.open(&request.host, Box::new(handler)).await?;
    session.send(&request.payload).await?;

    let frame = match events.recv().await {
        Some(DownloadEvent::Frame(frame)) => frame,
        Some(DownloadEvent::Failed(e)) => return Err(e),
        Some(DownloadEvent::Closed) | None => {
            return Err(LinkError::Download(DownloadError::NoResponse))
        }
    };
    let _ = session.close().await;

    let code = frame.status();
    if code != 0 {
        return Err(LinkError::Download(DownloadError::Status(code)));
    }
    let encrypted = frame.field(&request.field).ok_or_else(|| {
        LinkError::Codec(format!("response frame has no '{}' field", request.field))
    })?;

    let plain = decrypt_asset(&request.key, encrypted)?;
    tracing::debug!(
        host = %request.host,
        bytes = plain.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "file download complete"
    );
    Ok(plain)
}
