//! Shared object key generation for storage backends.

use crate::traits::{StorageError, StorageResult};

pub const STAGING_ROOT: &str = "staging";
pub const LETTERS_ROOT: &str = "letters";
pub const MERGED_FILENAME: &str = "merged.pdf";

/// Reject identifiers that would escape their scope once embedded in a key.
fn checked_segment<'a>(kind: &str, value: &'a str) -> StorageResult<&'a str> {
    if value.is_empty() || value.contains('/') || value.contains("..") {
        return Err(StorageError::InvalidKey(format!(
            "Invalid {} for storage key: {:?}",
            kind, value
        )));
    }
    Ok(value)
}

/// Listing scope of one upload's raw parts, with trailing `/`.
pub fn staging_prefix(upload_id: &str) -> StorageResult<String> {
    let upload_id = checked_segment("upload id", upload_id)?;
    Ok(format!("{}/{}/", STAGING_ROOT, upload_id))
}

/// Key of the merged document produced for one upload.
pub fn merged_key(upload_id: &str) -> StorageResult<String> {
    Ok(format!("{}{}", staging_prefix(upload_id)?, MERGED_FILENAME))
}

/// True for keys produced by [`merged_key`]; such objects are never staged as parts.
pub fn is_merged_output(key: &str) -> bool {
    key.rsplit('/').next() == Some(MERGED_FILENAME)
}

/// Scope holding every PDF published for one letter, with trailing `/`.
pub fn letter_prefix(date: &str) -> StorageResult<String> {
    let date = checked_segment("letter date", date)?;
    Ok(format!("{}/{}/", LETTERS_ROOT, date))
}

/// Key of the PDF an upload publishes as one version of a letter. Publishers racing for
/// the same timestamp still write distinct objects.
pub fn letter_pdf_key(date: &str, timestamp: &str, upload_id: &str) -> StorageResult<String> {
    let timestamp = checked_segment("version timestamp", timestamp)?;
    let upload_id = checked_segment("upload id", upload_id)?;
    Ok(format!(
        "{}{}-{}.pdf",
        letter_prefix(date)?,
        timestamp,
        upload_id
    ))
}
