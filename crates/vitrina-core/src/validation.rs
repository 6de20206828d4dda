//! Upload validation helpers used by the media service before a record is
//! created. Rejections surface as [`IngestError::InvalidAsset`].

use crate::error::IngestError;

/// Validate file size against the configured maximum.
pub fn validate_file_size(file_size: usize, max_size: usize) -> Result<(), IngestError> {
    if file_size == 0 {
        return Err(IngestError::InvalidAsset("File is empty".to_string()));
    }
    if file_size > max_size {
        return Err(IngestError::InvalidAsset(format!(
            "File size exceeds maximum allowed size of {} MB",
            max_size / 1024 / 1024
        )));
    }
    Ok(())
}

/// Normalize MIME type by stripping parameters
/// (e.g. "image/jpeg; charset=utf-8" -> "image/jpeg").
fn normalize_mime_type(content_type: &str) -> &str {
    content_type
        .split(';')
        .next()
        .map(|s| s.trim())
        .unwrap_or(content_type)
}

/// Validate content type against the allowlist. Compares the normalized
/// MIME type only, so parameters cannot bypass the check.
pub fn validate_content_type(
    content_type: &str,
    allowed_types: &[String],
) -> Result<(), IngestError> {
    let normalized = normalize_mime_type(content_type).to_lowercase();
    if !allowed_types.iter().any(|ct| normalized == ct.to_lowercase()) {
        return Err(IngestError::InvalidAsset(format!(
            "Invalid content type. Allowed types: {}",
            allowed_types.join(", ")
        )));
    }
    Ok(())
}

/// Validate the file extension and return it lowercased.
pub fn validate_file_extension(
    filename: &str,
    allowed_extensions: &[String],
) -> Result<String, IngestError> {
    let extension = match filename.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => ext.to_lowercase(),
        _ => String::new(),
    };

    if !allowed_extensions.contains(&extension) {
        return Err(IngestError::InvalidAsset(format!(
            "Invalid file extension. Allowed extensions: {}",
            allowed_extensions.join(", ")
        )));
    }
    Ok(extension)
}

/// Strip any path components and replace characters that are unsafe in
/// storage keys. Keeps the extension intact.
pub fn sanitize_filename(filename: &str) -> String {
    let base = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename)
        .trim();

    let sanitized: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if sanitized.trim_matches(['.', '_']).is_empty() {
        "unnamed".to_string()
    } else {
        sanitized
    }
}
