//! Classify an object and turn its body into a bounded, renderable preview.
//!
//! Routing is decided from the extension and declared size alone, so archives
//! and oversized objects are answered without downloading anything. Decoders
//! run on the blocking pool and every failure, including a panic, ends up as
//! [`PreviewResult::Error`] rather than escaping to the caller.

pub mod classify;
mod docx;
mod images;
mod table;
mod text;

use base64::Engine;
use serde::{Serialize, Serializer};
use tracing::{debug, warn};

use crate::error::BrowseError;
use crate::object_store::{read_to_limit, ObjectStore};
use classify::{Category, Classification, MAX_PREVIEW_BYTES};

/// A single spreadsheet or CSV cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PreviewResult {
    Text {
        content: String,
        language: String,
        truncated: bool,
    },
    Image {
        #[serde(serialize_with = "as_base64")]
        bytes: Vec<u8>,
        mime: String,
    },
    Csv {
        columns: Vec<String>,
        rows: Vec<Vec<CellValue>>,
    },
    Xlsx {
        columns: Vec<String>,
        rows: Vec<Vec<CellValue>>,
    },
    Docx {
        paragraphs: Vec<String>,
    },
    TooLarge {
        #[serde(rename = "sizeBytes")]
        size_bytes: u64,
    },
    Archive,
    Binary,
    Unsupported,
    Error {
        message: String,
    },
}

impl PreviewResult {
    fn error(e: impl std::fmt::Display) -> Self {
        PreviewResult::Error {
            message: e.to_string(),
        }
    }
}

fn as_base64<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
}

/// Decode an already fetched body. Pure and synchronous.
pub fn decode(category: Category, extension: &str, body: &[u8]) -> PreviewResult {
    let decoded = match category {
        Category::Text => Ok(text::preview_text(extension, body)),
        Category::Csv => table::preview_csv(body),
        Category::Spreadsheet => table::preview_spreadsheet(body),
        Category::Document => docx::preview_docx(body),
        Category::Image => images::preview_image(extension, body),
    };
    decoded.unwrap_or_else(|e| {
        debug!("Preview decode failed: {}", e);
        PreviewResult::error(e)
    })
}

/// Preview `key`, reading its body at most once.
///
/// Without a `size_hint` the size comes from a HEAD request. Never fails;
/// store errors are reported inside the result.
pub async fn preview_object(
    store: &dyn ObjectStore,
    bucket: &str,
    key: &str,
    size_hint: Option<u64>,
) -> PreviewResult {
    let name = key.rsplit('/').next().unwrap_or(key);
    let extension = classify::extension_of(name);

    if classify::is_archive(&extension) {
        return PreviewResult::Archive;
    }

    let size = match size_hint {
        Some(size) => size,
        None => match store.head_object(bucket, key).await {
            Ok(head) => head.size_bytes,
            Err(e) => return PreviewResult::error(e),
        },
    };

    let category = match classify::classify(&extension, size) {
        Classification::Archive => return PreviewResult::Archive,
        Classification::TooLarge(size_bytes) => {
            debug!("Skipping preview of {} ({} bytes)", key, size_bytes);
            return PreviewResult::TooLarge { size_bytes };
        }
        Classification::Unsupported => return PreviewResult::Unsupported,
        Classification::Decode(category) => category,
    };

    let body = match store.open_object(bucket, key).await {
        Ok(stream) => read_to_limit(stream, MAX_PREVIEW_BYTES).await,
        Err(e) => Err(e),
    };
    let body = match body {
        Ok(body) => body,
        Err(BrowseError::TooLarge { limit }) => {
            warn!("{} is larger than its declared size of {} bytes", key, size);
            return PreviewResult::TooLarge {
                size_bytes: size.max(limit + 1),
            };
        }
        Err(e) => return PreviewResult::error(e),
    };

    debug!(
        "Decoding {} as {:?} ({} bytes)",
        key,
        category,
        body.len()
    );
    let decoded =
        tokio::task::spawn_blocking(move || decode(category, &extension, &body)).await;
    match decoded {
        Ok(result) => result,
        Err(e) => {
            warn!("Preview decoder for {} crashed: {}", key, e);
            PreviewResult::error(format!("preview decoder crashed: {e}"))
        }
    }
}
