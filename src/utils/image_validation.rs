//! Validation for uploaded product images. Deliberately shallow: a
//! content-type allowlist and a size cap, nothing that inspects pixels.

use crate::error::AppError;

/// MIME types the vision provider accepts for images.
pub const ALLOWED_IMAGE_MIME_TYPES: &[&str] =
    &["image/jpeg", "image/png", "image/webp", "image/gif"];

/// Strips parameters and normalizes case so `image/JPEG; charset=x`
/// compares equal to `image/jpeg`.
fn canonicalize_mime(mime: &str) -> String {
    mime.split(';')
        .next()
        .unwrap_or(mime)
        .trim()
        .to_ascii_lowercase()
}

pub fn validate_image_upload(mime_type: &str, size_bytes: usize, max_bytes: u64) -> Result<(), AppError> {
    let canonical = canonicalize_mime(mime_type);

    if !canonical.starts_with("image/") {
        return Err(AppError::Validation(
            "Invalid file type. Please upload an image.".to_string(),
        ));
    }

    if !ALLOWED_IMAGE_MIME_TYPES
        .iter()
        .any(|&allowed| allowed == canonical)
    {
        return Err(AppError::Validation(format!(
            "Unsupported image type: {}",
            canonical
        )));
    }

    if size_bytes as u64 > max_bytes {
        return Err(AppError::Validation(format!(
            "Image exceeds the maximum size of {} bytes",
            max_bytes
        )));
    }

    Ok(())
}
