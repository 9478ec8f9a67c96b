use std::collections::HashMap;

use axum::extract::{multipart::MultipartError, Multipart};
use axum::http::StatusCode;

use crate::error::{ApiError, Result};
use crate::media::MediaKind;

/// A file part of a multipart body.
#[derive(Debug)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    /// Rejects parts that are not `kind`.
    pub fn expect_kind(&self, kind: MediaKind) -> Result<()> {
        if kind.accepts(self.content_type.as_deref(), &self.file_name) {
            return Ok(());
        }
        Err(match kind {
            MediaKind::Image => ApiError::validation("Only image files are accepted"),
            MediaKind::Video => ApiError::validation("Only video files are accepted"),
        })
    }
}

/// A multipart body read into memory: text fields and file parts by name.
/// Empty file parts (a form submitted without a file) are dropped.
#[derive(Debug, Default)]
pub struct FormData {
    fields: HashMap<String, String>,
    files: HashMap<String, UploadedFile>,
}

fn rejection(error: MultipartError) -> ApiError {
    if error.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge("Upload exceeds the size limit".into())
    } else {
        ApiError::Validation(error.body_text())
    }
}

impl FormData {
    pub async fn read(mut multipart: Multipart) -> Result<Self> {
        let mut form = FormData::default();

        while let Some(field) = multipart.next_field().await.map_err(rejection)? {
            let Some(name) = field.name().map(str::to_owned) else {
                continue;
            };

            match field.file_name().map(str::to_owned) {
                Some(file_name) => {
                    let content_type = field.content_type().map(str::to_owned);
                    let bytes = field.bytes().await.map_err(rejection)?;
                    if !bytes.is_empty() {
                        form.files.insert(
                            name,
                            UploadedFile {
                                file_name,
                                content_type,
                                bytes: bytes.to_vec(),
                            },
                        );
                    }
                }
                None => {
                    let value = field.text().await.map_err(rejection)?;
                    form.fields.insert(name, value);
                }
            }
        }

        Ok(form)
    }

    /// Trimmed text field, `None` when missing or blank.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }

    pub fn required(&self, name: &str) -> Result<&str> {
        self.text(name)
            .ok_or_else(|| ApiError::validation(format!("{name} is required")))
    }

    pub fn take_file(&mut self, name: &str) -> Option<UploadedFile> {
        self.files.remove(name)
    }
}
