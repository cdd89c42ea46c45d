//! Media encoding for image attachments and generated images.
//!
//! Attachments travel as base64 text plus a MIME type. Inside the message log
//! images are kept as `data:` URIs so a single string can be rendered or saved.

use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ChatError, Result};

/// An image staged for sending: base64 payload without a data-URI prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingImage {
    pub base64: String,
    pub mime_type: String,
}

impl PendingImage {
    pub fn new(base64: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            base64: base64.into(),
            mime_type: mime_type.into(),
        }
    }

    pub fn data_uri(&self) -> String {
        data_uri(&self.mime_type, &self.base64)
    }

    /// Size of the decoded payload, estimated from the base64 length.
    pub fn approx_bytes(&self) -> usize {
        approx_decoded_len(&self.base64)
    }
}

pub fn data_uri(mime_type: &str, base64: &str) -> String {
    format!("data:{};base64,{}", mime_type, base64)
}

/// Encode raw bytes. Any MIME type is accepted and forwarded verbatim.
pub fn encode_bytes(bytes: &[u8], mime_type: &str) -> PendingImage {
    PendingImage::new(BASE64_STANDARD.encode(bytes), mime_type)
}

/// Read a file fully and encode it, guessing the MIME type from its extension.
pub async fn encode_file(path: impl AsRef<Path>) -> Result<PendingImage> {
    let path = path.as_ref();
    let bytes = tokio::fs::read(path).await.map_err(|source| ChatError::ImageRead {
        path: path.to_path_buf(),
        source,
    })?;

    let mime = mime_guess::from_path(path).first_or_octet_stream();
    debug!(path = %path.display(), mime = %mime, bytes = bytes.len(), "encoded attachment");

    Ok(encode_bytes(&bytes, mime.essence_str()))
}

/// Split a base64 `data:` URI into its MIME type and decoded bytes.
pub fn parse_data_uri(uri: &str) -> Result<(String, Vec<u8>)> {
    let rest = uri.strip_prefix("data:").ok_or(ChatError::InvalidDataUri)?;
    let (meta, payload) = rest.split_once(',').ok_or(ChatError::InvalidDataUri)?;
    let mime_type = meta.strip_suffix(";base64").ok_or(ChatError::InvalidDataUri)?;

    let bytes = BASE64_STANDARD
        .decode(payload.trim())
        .map_err(|_| ChatError::InvalidDataUri)?;

    let mime_type = if mime_type.is_empty() {
        "application/octet-stream"
    } else {
        mime_type
    };
    Ok((mime_type.to_string(), bytes))
}

/// MIME type and decoded size of a data URI, without decoding it.
pub fn describe_data_uri(uri: &str) -> Option<(&str, usize)> {
    let rest = uri.strip_prefix("data:")?;
    let (meta, payload) = rest.split_once(',')?;
    let mime_type = meta.strip_suffix(";base64")?;
    Some((mime_type, approx_decoded_len(payload)))
}

/// Decode a data URI and write it to `dir/<stem>.<ext>`.
pub async fn save_data_uri(uri: &str, dir: &Path, stem: &str) -> Result<PathBuf> {
    let (mime_type, bytes) = parse_data_uri(uri)?;

    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(format!("{}.{}", stem, extension_for(&mime_type)));
    tokio::fs::write(&path, &bytes).await?;

    debug!(path = %path.display(), bytes = bytes.len(), "saved image");
    Ok(path)
}

fn extension_for(mime_type: &str) -> &'static str {
    match mime_type {
        "image/png" => "png",
        "image/jpeg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        other => mime_guess::get_mime_extensions_str(other)
            .and_then(|exts| exts.first().copied())
            .unwrap_or("bin"),
    }
}

fn approx_decoded_len(base64: &str) -> usize {
    let trimmed = base64.trim_end_matches('=');
    trimmed.len() * 3 / 4
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_uri_format() {
        let image = PendingImage::new("Zm9v", "image/png");
        assert_eq!(image.data_uri(), "data:image/png;base64,Zm9v");
    }

    #[test]
    fn test_encode_bytes_keeps_mime_verbatim() {
        let image = encode_bytes(b"foo", "application/x-custom");
        assert_eq!(image.base64, "Zm9v");
        assert_eq!(image.mime_type, "application/x-custom");
        assert_eq!(image.approx_bytes(), 3);
    }

    #[tokio::test]
    async fn test_encode_file_guesses_mime() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cat.png");
        std::fs::write(&path, b"foo").unwrap();

        let image = encode_file(&path).await.unwrap();
        assert_eq!(image.base64, "Zm9v");
        assert_eq!(image.mime_type, "image/png");
    }

    #[tokio::test]
    async fn test_encode_file_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob");
        std::fs::write(&path, [0u8, 1, 2]).unwrap();

        let image = encode_file(&path).await.unwrap();
        assert_eq!(image.mime_type, "application/octet-stream");
    }

    #[tokio::test]
    async fn test_encode_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.png");

        let err = encode_file(&path).await.unwrap_err();
        match err {
            ChatError::ImageRead { path: failed, .. } => assert_eq!(failed, path),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_parse_data_uri() {
        let (mime, bytes) = parse_data_uri("data:image/png;base64,Zm9v").unwrap();
        assert_eq!(mime, "image/png");
        assert_eq!(bytes, b"foo");
    }

    #[test]
    fn test_parse_data_uri_rejects_other_strings() {
        assert!(parse_data_uri("Sorry, I couldn't generate an image.").is_err());
        assert!(parse_data_uri("data:text/plain,hello").is_err());
        assert!(parse_data_uri("data:image/png;base64,***").is_err());
    }

    #[test]
    fn test_describe_data_uri() {
        assert_eq!(describe_data_uri("data:image/png;base64,Zm9vYg=="), Some(("image/png", 4)));
        assert_eq!(describe_data_uri("https://example.com/cat.png"), None);
    }

    #[tokio::test]
    async fn test_save_data_uri() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("images");

        let path = save_data_uri("data:image/jpeg;base64,Zm9v", &target, "gemini-msg-2")
            .await
            .unwrap();

        assert_eq!(path, target.join("gemini-msg-2.jpg"));
        assert_eq!(std::fs::read(&path).unwrap(), b"foo");
    }
}
