//! Download path: frame assembly across chunks, result codes, decryption.

mod support;

use std::collections::HashMap;

use imlink_client::file::{download_file, encrypt_asset, DownloadRequest};
use imlink_core::codec::{frame_encode, FileResponse, FileResponseDecoder};
use imlink_core::error::{DownloadError, LinkError, LinkResult};
use imlink_core::transport::{BoxFuture, SocketConnector, SocketHandler, SocketSession};

const KEY: [u8; 16] = [9u8; 16];

/// Connector whose session feeds scripted chunks through the handler as
/// soon as the request payload is sent.
struct ScriptedSocket {
    chunks: Vec<Vec<u8>>,
    disconnect_after: bool,
}

impl SocketConnector for ScriptedSocket {
    fn open<'a>(
        &'a self,
        _host: &'a str,
        handler: Box<dyn SocketHandler>,
    ) -> BoxFuture<'a, LinkResult<Box<dyn SocketSession>>> {
        Box::pin(async move {
            let mut handler = handler;
            handler.on_connect();
            Ok(Box::new(ScriptedSession {
                handler,
                chunks: self.chunks.clone(),
                disconnect_after: self.disconnect_after,
            }) as Box<dyn SocketSession>)
        })
    }
}

struct ScriptedSession {
    handler: Box<dyn SocketHandler>,
    chunks: Vec<Vec<u8>>,
    disconnect_after: bool,
}

impl SocketSession for ScriptedSession {
    fn send<'a>(&'a mut self, _payload: &'a [u8]) -> BoxFuture<'a, LinkResult<()>> {
        Box::pin(async move {
            for chunk in std::mem::take(&mut self.chunks) {
                self.handler.on_receive(&chunk);
            }
            if self.disconnect_after {
                self.handler.on_disconnect();
            }
            Ok(())
        })
    }

    fn close(&mut self) -> BoxFuture<'_, LinkResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

fn request() -> DownloadRequest {
    DownloadRequest {
        host: "fs.example".into(),
        payload: b"GET".to_vec(),
        key: KEY,
        field: "filedata".into(),
    }
}

fn response_wire(code: i32, field: &str, data: &[u8]) -> Vec<u8> {
    let mut fields = HashMap::new();
    fields.insert(field.to_string(), data.to_vec());
    frame_encode(&FileResponse { code, fields }).unwrap()
}

#[tokio::test]
async fn download_assembles_a_frame_split_across_chunks() {
    support::init_tracing();
    let plain = b"attachment-bytes";
    let asset = encrypt_asset(plain, Some(KEY));
    let wire = response_wire(0, "filedata", &asset.ciphertext);
    let mid = wire.len() / 2;

    let sockets = ScriptedSocket {
        chunks: vec![wire[..mid].to_vec(), wire[mid..].to_vec()],
        disconnect_after: false,
    };
    let got = download_file(&sockets, FileResponseDecoder::new(), &request())
        .await
        .unwrap();
    assert_eq!(got, plain);
}

#[tokio::test]
async fn download_fails_when_the_stream_ends_without_a_frame() {
    let wire = response_wire(0, "filedata", b"x");
    // Only the first half ever arrives.
    let sockets = ScriptedSocket {
        chunks: vec![wire[..wire.len() / 2].to_vec()],
        disconnect_after: true,
    };
    let err = download_file(&sockets, FileResponseDecoder::new(), &request())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        LinkError::Download(DownloadError::NoResponse)
    ));
}

#[tokio::test]
async fn download_fails_on_a_non_zero_result_code() {
    let wire = response_wire(-301, "filedata", &[]);
    let sockets = ScriptedSocket {
        chunks: vec![wire],
        disconnect_after: false,
    };
    let err = download_file(&sockets, FileResponseDecoder::new(), &request())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        LinkError::Download(DownloadError::Status(-301))
    ));
}

#[tokio::test]
async fn download_fails_when_the_named_field_is_missing() {
    let asset = encrypt_asset(b"payload", Some(KEY));
    let wire = response_wire(0, "otherfield", &asset.ciphertext);
    let sockets = ScriptedSocket {
        chunks: vec![wire],
        disconnect_after: false,
    };
    let err = download_file(&sockets, FileResponseDecoder::new(), &request())
        .await
        .unwrap_err();
    assert!(matches!(err, LinkError::Codec(_)));
}
