use actix_multipart::Multipart;
use futures::StreamExt;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::store::new_id;

const MAX_TEXT_FIELD_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    Audio,
    Image,
}

impl UploadKind {
    pub fn max_bytes(self) -> usize {
        match self {
            UploadKind::Audio => 50 * 1024 * 1024,
            UploadKind::Image => 5 * 1024 * 1024,
        }
    }

    pub fn accepts(self, mime_type: &str) -> bool {
        let allowed: &[&str] = match self {
            UploadKind::Audio => &[
                "audio/mpeg",
                "audio/mp3",
                "audio/wav",
                "audio/x-wav",
                "audio/flac",
                "audio/x-flac",
                "audio/aac",
                "audio/ogg",
                "audio/mp4",
                "audio/x-m4a",
            ],
            UploadKind::Image => &["image/jpeg", "image/png", "image/webp", "image/gif"],
        };
        allowed.contains(&mime_type)
    }

    fn label(self) -> &'static str {
        match self {
            UploadKind::Audio => "audio (MP3/WAV/FLAC/AAC/OGG/M4A)",
            UploadKind::Image => "image (JPEG/PNG/WEBP/GIF)",
        }
    }
}

#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub stored_name: String,
    pub path: PathBuf,
    pub original_filename: String,
    pub mime_type: String,
    pub size: i64,
}

impl UploadedFile {
    /// Best-effort removal, used when the rest of the request fails.
    pub async fn discard(&self) {
        if let Err(e) = tokio::fs::remove_file(&self.path).await {
            tracing::warn!(path = %self.path.display(), "Failed to remove upload: {}", e);
        }
    }
}

#[derive(Debug, Default)]
pub struct UploadForm {
    pub fields: HashMap<String, String>,
    pub file: Option<UploadedFile>,
}

impl UploadForm {
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn parse<T: std::str::FromStr>(&self, name: &str) -> Result<Option<T>> {
        match self.text(name) {
            Some(raw) => raw
                .parse()
                .map(Some)
                .map_err(|_| AppError::BadRequest(format!("Invalid value for {}", name))),
            None => Ok(None),
        }
    }

    pub fn flag(&self, name: &str) -> bool {
        matches!(self.text(name), Some("true") | Some("1") | Some("on"))
    }
}

fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect();
    if cleaned.trim_matches('.').is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}

/// Reads a multipart body: the part named `file_field` is written into `dir`, every other
/// part is kept as a text field. A stored file is removed again if any later part fails.
pub async fn read_upload(
    mut payload: Multipart,
    file_field: &str,
    kind: UploadKind,
    dir: &Path,
) -> Result<UploadForm> {
    tokio::fs::create_dir_all(dir).await?;
    let mut form = UploadForm::default();

    if let Err(e) = read_parts(&mut payload, file_field, kind, dir, &mut form).await {
        if let Some(file) = form.file.take() {
            file.discard().await;
        }
        return Err(e);
    }
    Ok(form)
}

async fn read_parts(
    payload: &mut Multipart,
    file_field: &str,
    kind: UploadKind,
    dir: &Path,
    form: &mut UploadForm,
) -> Result<()> {
    while let Some(field) = payload.next().await {
        let mut field = field.map_err(|e| AppError::BadRequest(format!("Invalid multipart body: {}", e)))?;
        let name = field.name().unwrap_or_default().to_string();

        if name != file_field {
            let mut value = Vec::new();
            while let Some(chunk) = field.next().await {
                let data = chunk.map_err(|e| AppError::BadRequest(e.to_string()))?;
                if value.len() + data.len() > MAX_TEXT_FIELD_BYTES {
                    return Err(AppError::BadRequest(format!("Field {} is too large", name)));
                }
                value.extend_from_slice(&data);
            }
            let value = String::from_utf8(value)
                .map_err(|_| AppError::BadRequest(format!("Field {} is not valid UTF-8", name)))?;
            form.fields.insert(name, value);
            continue;
        }

        if form.file.is_some() {
            return Err(AppError::BadRequest("Only one file may be uploaded".to_string()));
        }

        let mime_type = field
            .content_type()
            .map(|m| m.essence_str().to_string())
            .ok_or_else(|| AppError::BadRequest("No content type specified".to_string()))?;
        if !kind.accepts(&mime_type) {
            return Err(AppError::BadRequest(format!(
                "Invalid file format, expected {}",
                kind.label()
            )));
        }

        let original_filename = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .unwrap_or("upload")
            .to_string();
        let stored_name = format!("{}_{}", new_id(), sanitize_filename(&original_filename));
        let path = dir.join(&stored_name);

        let mut file = tokio::fs::File::create(&path).await?;
        // Tracked before writing; the caller removes it on any error.
        let stored = form.file.insert(UploadedFile {
            stored_name,
            path,
            original_filename,
            mime_type,
            size: 0,
        });
        let mut size = 0usize;
        while let Some(chunk) = field.next().await {
            let data = chunk.map_err(|e| AppError::BadRequest(e.to_string()))?;
            size += data.len();
            if size > kind.max_bytes() {
                return Err(AppError::BadRequest(format!(
                    "File exceeds the {} MB limit",
                    kind.max_bytes() / (1024 * 1024)
                )));
            }
            file.write_all(&data).await?;
        }
        file.flush().await?;
        stored.size = size as i64;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_paths_and_odd_characters() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("my song (live).mp3"), "my_song__live_.mp3");
        assert_eq!(sanitize_filename(".."), "upload");
    }

    #[test]
    fn audio_and_image_types_are_separate() {
        assert!(UploadKind::Audio.accepts("audio/mpeg"));
        assert!(!UploadKind::Audio.accepts("image/png"));
        assert!(UploadKind::Image.accepts("image/png"));
        assert!(UploadKind::Image.max_bytes() < UploadKind::Audio.max_bytes());
    }

    #[test]
    fn form_flags_and_numbers() {
        let mut form = UploadForm::default();
        form.fields.insert("is_exclusive".to_string(), "true".to_string());
        form.fields.insert("track_number".to_string(), " 3 ".to_string());
        form.fields.insert("duration".to_string(), "abc".to_string());

        assert!(form.flag("is_exclusive"));
        assert!(!form.flag("missing"));
        assert_eq!(form.parse::<i64>("track_number").unwrap(), Some(3));
        assert!(form.parse::<i64>("duration").is_err());
        assert_eq!(form.parse::<i64>("missing").unwrap(), None);
    }
}
