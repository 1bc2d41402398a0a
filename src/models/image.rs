//! Fetched image and pipeline output structures.

use std::path::PathBuf;

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};

use crate::models::Title;

/// Lower-case hex MD5 digest of a byte payload.
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Md5::digest(bytes))
}

/// Raw image bytes downloaded for a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedImage {
    pub source_url: String,
    pub bytes: Vec<u8>,
    pub extension: String,
    pub content_hash: String,
}

impl FetchedImage {
    pub fn new(source_url: impl Into<String>, bytes: Vec<u8>, extension: impl Into<String>) -> Self {
        let content_hash = content_hash(&bytes);
        Self {
            source_url: source_url.into(),
            bytes,
            extension: extension.into(),
            content_hash,
        }
    }

    /// Cache file name, `{hash}.{extension}`.
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.content_hash, self.extension)
    }
}

/// A page cleared for announcement, with its cached image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptedCandidate {
    pub title: Title,
    pub image_path: PathBuf,
    pub image_url: String,
    pub content_hash: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_is_lowercase_md5_hex() {
        assert_eq!(content_hash(b""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(content_hash(b"hello"), "5d41402abc4b2a76b9719d911017c592");
    }

    #[test]
    fn file_name_joins_hash_and_extension() {
        let image = FetchedImage::new("https://img.example/a.png", b"hello".to_vec(), "png");
        assert_eq!(image.file_name(), "5d41402abc4b2a76b9719d911017c592.png");
    }
}
