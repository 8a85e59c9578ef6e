//! Validation and object keys for media attachments
//!
//! All checks run before any network call.

use chrono::Utc;

use crate::error::{MessagingError, Result};

pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;
pub const MAX_VIDEO_BYTES: usize = 50 * 1024 * 1024;
pub const MAX_VIDEO_SECONDS: u32 = 180;

pub const ALLOWED_IMAGE_TYPES: &[&str] = &[
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/webp",
    "image/gif",
];

pub const ALLOWED_VIDEO_TYPES: &[&str] = &["video/mp4", "video/webm", "video/quicktime"];

/// A file picked by the user, read into memory
#[derive(Debug, Clone)]
pub struct MediaFile {
    pub file_name: String,
    /// Declared type; guessed from the file name when absent
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl MediaFile {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: None,
            bytes,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn content_type(&self) -> String {
        self.content_type.clone().unwrap_or_else(|| {
            mime_guess::from_path(&self.file_name)
                .first_or_octet_stream()
                .essence_str()
                .to_string()
        })
    }

    pub fn extension(&self) -> &str {
        match self.file_name.rsplit_once('.') {
            Some((_, ext)) if !ext.is_empty() => ext,
            _ => "bin",
        }
    }
}

/// Check an image against the type list and `max_bytes`; returns its content type.
pub fn validate_image(file: &MediaFile, max_bytes: usize) -> Result<String> {
    if file.bytes.len() > max_bytes {
        return Err(MessagingError::FileTooLarge {
            size: file.bytes.len(),
            max: max_bytes,
        });
    }

    let content_type = file.content_type();
    if !ALLOWED_IMAGE_TYPES.contains(&content_type.as_str()) {
        return Err(MessagingError::InvalidFileType(content_type));
    }
    Ok(content_type)
}

/// Check a short-form video. `duration_secs` comes from the container metadata.
pub fn validate_video(file: &MediaFile, duration_secs: u32) -> Result<String> {
    if file.bytes.len() > MAX_VIDEO_BYTES {
        return Err(MessagingError::FileTooLarge {
            size: file.bytes.len(),
            max: MAX_VIDEO_BYTES,
        });
    }

    let content_type = file.content_type();
    if !ALLOWED_VIDEO_TYPES.contains(&content_type.as_str()) {
        return Err(MessagingError::InvalidFileType(content_type));
    }

    if duration_secs > MAX_VIDEO_SECONDS {
        return Err(MessagingError::VideoTooLong {
            duration: duration_secs,
            max: MAX_VIDEO_SECONDS,
        });
    }
    Ok(content_type)
}

/// Unique object key under the uploader's prefix: `<user>/<millis>-<uuid>.<ext>`
pub fn object_key(user_id: &str, file: &MediaFile) -> String {
    format!(
        "{}/{}-{}.{}",
        user_id,
        Utc::now().timestamp_millis(),
        uuid::Uuid::new_v4().simple(),
        file.extension().to_ascii_lowercase()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_type_guessed_from_name() {
        let file = MediaFile::new("cat.PNG", vec![0; 16]);
        assert_eq!(validate_image(&file, MAX_IMAGE_BYTES).unwrap(), "image/png");
    }

    #[test]
    fn test_image_rejections() {
        let big = MediaFile::new("big.jpg", vec![0; MAX_IMAGE_BYTES + 1]);
        assert!(matches!(
            validate_image(&big, MAX_IMAGE_BYTES),
            Err(MessagingError::FileTooLarge { .. })
        ));

        let pdf = MediaFile::new("doc.pdf", vec![0; 10]);
        let err = validate_image(&pdf, MAX_IMAGE_BYTES).unwrap_err();
        assert!(err.is_validation());
        assert_eq!(err.code(), Some("INVALID_FILE_TYPE"));

        let declared = MediaFile::new("photo", vec![0; 10]).with_content_type("image/webp");
        assert!(validate_image(&declared, MAX_IMAGE_BYTES).is_ok());
    }

    #[test]
    fn test_video_duration_limit() {
        let clip = MediaFile::new("clip.mp4", vec![0; 1024]);
        assert!(validate_video(&clip, 60).is_ok());
        assert!(matches!(
            validate_video(&clip, 181),
            Err(MessagingError::VideoTooLong { .. })
        ));

        let mov = MediaFile::new("clip", vec![0; 1024]).with_content_type("video/quicktime");
        assert!(validate_video(&mov, 10).is_ok());
    }

    #[test]
    fn test_object_key_is_user_scoped_and_unique() {
        let file = MediaFile::new("a.JPG", vec![]);
        let first = object_key("u1", &file);
        let second = object_key("u1", &file);
        assert!(first.starts_with("u1/"));
        assert!(first.ends_with(".jpg"));
        assert_ne!(first, second);

        let no_ext = MediaFile::new("blob", vec![]);
        assert!(object_key("u1", &no_ext).ends_with(".bin"));
    }
}
