//! Length-prefixed CBOR framing for file-transfer response streams.
//!
//! Wire format: `[4-byte big-endian length][CBOR payload]`

use std::collections::HashMap;
use std::io::Cursor;

use serde::{Deserialize, Serialize};

use crate::error::LinkResult;
use crate::transport::{ResponseDecoder, ResponseFrame};

/// Encode a serializable value into a length-prefixed CBOR frame.
pub fn frame_encode<T: serde::Serialize>(value: &T) -> LinkResult<Vec<u8>> {
    let mut payload = Vec::new();
    ciborium::into_writer(value, &mut payload)?;

    let len = payload.len() as u32;
    let mut frame = Vec::with_capacity(4 + payload.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend(payload);
    Ok(frame)
}

/// Decode a CBOR payload (without length prefix) into a typed value.
pub fn cbor_decode<T: serde::de::DeserializeOwned>(data: &[u8]) -> LinkResult<T> {
    let cursor = Cursor::new(data);
    let value: T = ciborium::from_reader(cursor)?;
    Ok(value)
}

/// A decoded file-transfer response: a result code plus named binary
/// fields. Zero means success; the encrypted file data rides in one of the
/// fields, keyed by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileResponse {
    pub code: i32,
    pub fields: HashMap<String, Vec<u8>>,
}

impl FileResponse {
    pub fn ok(fields: HashMap<String, Vec<u8>>) -> Self {
        Self { code: 0, fields }
    }

    pub fn failed(code: i32) -> Self {
        Self {
            code,
            fields: HashMap::new(),
        }
    }
}

impl ResponseFrame for FileResponse {
    fn status(&self) -> i32 {
        self.code
    }

    fn field(&self, name: &str) -> Option<&[u8]> {
        self.fields.get(name).map(Vec::as_slice)
    }
}

/// Streaming decoder for [`FileResponse`] frames: accumulates bytes and
/// yields each frame once its length prefix is satisfied.
#[derive(Debug, Default)]
pub struct FileResponseDecoder {
    buffer: Vec<u8>,
}

impl FileResponseDecoder {
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Number of bytes buffered toward an incomplete frame.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

impl ResponseDecoder for FileResponseDecoder {
    type Frame = FileResponse;

    fn reset(&mut self) {
        self.buffer.clear();
    }

    fn update(&mut self, chunk: &[u8]) -> LinkResult<Vec<FileResponse>> {
        self.buffer.extend_from_slice(chunk);
        let mut frames = Vec::new();

        loop {
            if self.buffer.len() < 4 {
                break;
            }
            let len = u32::from_be_bytes([
                self.buffer[0],
                self.buffer[1],
                self.buffer[2],
                self.buffer[3],
            ]) as usize;

            if self.buffer.len() < 4 + len {
                break;
            }

            let frame: FileResponse = cbor_decode(&self.buffer[4..4 + len])?;
            frames.push(frame);
            self.buffer.drain(..4 + len);
        }

        Ok(frames)
    }
}
