//! Upload preparation: per-asset encryption plus the media metadata the
//! declaration step needs.
//!
//! Width/height and duration are always probed from the *plaintext*; the
//! payload maps are always keyed by the *ciphertext* digest, so the caller
//! can address each encrypted blob by the same identifier the metadata
//! declares. An asset and its thumbnail share one symmetric key; the
//! receiving protocol expects a single key to unlock both variants.

use std::collections::HashMap;

use imlink_core::error::LinkResult;

use super::cipher::{encrypt_asset, BufferMeta, EncryptedAsset, KEY_LEN};

/// Long-edge bound for image thumbnails, in pixels.
pub const IMAGE_THUMB_EDGE: u32 = 120;
/// Long-edge bound for video cover thumbnails, in pixels.
pub const VIDEO_THUMB_EDGE: u32 = 360;

/// Media inspection supplied by the embedding application (dimension and
/// duration extraction, thumbnail generation).
pub trait MediaProbe: Send + Sync {
    fn image_dimensions(&self, data: &[u8]) -> LinkResult<(u32, u32)>;

    fn video_duration_secs(&self, data: &[u8]) -> LinkResult<f32>;

    /// Downscale an image so its long edge is at most `max_edge`.
    fn image_thumbnail(&self, data: &[u8], max_edge: u32) -> LinkResult<Vec<u8>>;

    /// Extract a cover frame bounded to `max_edge` on its long edge.
    fn video_thumbnail(&self, data: &[u8], max_edge: u32) -> LinkResult<Vec<u8>>;
}

/// Metadata for one encrypted variant of an asset.
#[derive(Debug, Clone)]
pub struct AssetPart {
    pub plain: BufferMeta,
    pub cipher: BufferMeta,
}

/// Ciphertexts keyed by their own digest.
pub type PayloadMap = HashMap<String, Vec<u8>>;

#[derive(Debug)]
pub struct ImageUpload {
    pub key: [u8; KEY_LEN],
    pub width: u32,
    pub height: u32,
    pub image: AssetPart,
    pub thumb: Option<AssetPart>,
    pub payloads: PayloadMap,
}

#[derive(Debug)]
pub struct VideoUpload {
    pub key: [u8; KEY_LEN],
    pub duration_secs: f32,
    pub video: AssetPart,
    pub thumb: AssetPart,
    pub payloads: PayloadMap,
}

#[derive(Debug)]
pub struct FileUpload {
    pub key: [u8; KEY_LEN],
    pub file: AssetPart,
    pub payloads: PayloadMap,
}

fn stash(payloads: &mut PayloadMap, asset: EncryptedAsset) -> AssetPart {
    let EncryptedAsset {
        plain,
        cipher,
        ciphertext,
        ..
    } = asset;
    payloads.insert(cipher.digest.clone(), ciphertext);
    AssetPart { plain, cipher }
}

/// Encrypt an image for upload, optionally with a 120px-bounded thumbnail
/// under the same key.
pub fn prepare_image(
    probe: &dyn MediaProbe,
    data: &[u8],
    use_thumb: bool,
) -> LinkResult<ImageUpload> {
    let (width, height) = probe.image_dimensions(data)?;

    let full = encrypt_asset(data, None);
    let key = full.key;

    let mut payloads = PayloadMap::new();
    let thumb = if use_thumb {
        let small = probe.image_thumbnail(data, IMAGE_THUMB_EDGE)?;
        Some(stash(&mut payloads, encrypt_asset(&small, Some(key))))
    } else {
        None
    };
    let image = stash(&mut payloads, full);

    tracing::debug!(
        width,
        height,
        variants = payloads.len(),
        "image upload prepared"
    );
    Ok(ImageUpload {
        key,
        width,
        height,
        image,
        thumb,
        payloads,
    })
}

/// Encrypt a video for upload together with its cover thumbnail, both under
/// one key.
pub fn prepare_video(probe: &dyn MediaProbe, data: &[u8]) -> LinkResult<VideoUpload> {
    let duration_secs = probe.video_duration_secs(data)?;
    let cover = probe.video_thumbnail(data, VIDEO_THUMB_EDGE)?;

    let full = encrypt_asset(data, None);
    let key = full.key;

    let mut payloads = PayloadMap::new();
    let thumb = stash(&mut payloads, encrypt_asset(&cover, Some(key)));
    let video = stash(&mut payloads, full);

    tracing::debug!(duration_secs = f64::from(duration_secs), "video upload prepared");
    Ok(VideoUpload {
        key,
        duration_secs,
        video,
        thumb,
        payloads,
    })
}

/// Encrypt a generic file for upload. No derived thumbnail.
pub fn prepare_file(data: &[u8]) -> FileUpload {
    let full = encrypt_asset(data, None);
    let key = full.key;

    let mut payloads = PayloadMap::new();
    let file = stash(&mut payloads, full);

    FileUpload {
        key,
        file,
        payloads,
    }
}
