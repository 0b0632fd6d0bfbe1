//! File-transfer pipeline: upload-side encryption/metadata assembly and
//! download-side frame assembly/decryption.

pub mod cipher;
pub mod download;
pub mod upload;

pub use cipher::{decrypt_asset, encrypt_asset, generate_key, BufferMeta, EncryptedAsset, KEY_LEN};
pub use download::{download_file, DownloadRequest};
pub use upload::{
    prepare_file, prepare_image, prepare_video, AssetPart, FileUpload, ImageUpload, MediaProbe,
    PayloadMap, VideoUpload, IMAGE_THUMB_EDGE, VIDEO_THUMB_EDGE,
};
