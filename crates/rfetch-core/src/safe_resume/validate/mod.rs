//! Compares a loaded checkpoint's recorded metadata with a fresh HEAD result
//! for safe resume.

mod error;

use crate::checkpoint::CheckpointRecord;
use crate::fetch_head::HeadResult;

pub use error::{ValidationError, ValidationErrorKind};

/// Returns Ok(()) if `checkpoint` can be safely resumed against the current
/// HEAD result.
///
/// A checkpoint with no stored size/ETag/Last-Modified (first run, or a
/// server that never sent any of them) always passes, since there is nothing
/// to compare against. Otherwise any mismatch in ETag, Last-Modified, or
/// size is a validation failure; the caller must pass an explicit restart
/// override to discard the checkpoint and re-prepare from scratch.
pub fn validate_for_resume(checkpoint: &CheckpointRecord, head: &HeadResult) -> Result<(), ValidationError> {
    let has_stored =
        checkpoint.total_size > 0 || checkpoint.etag.is_some() || checkpoint.last_modified.is_some();

    if !has_stored {
        return Ok(());
    }

    let etag_changed = match (&checkpoint.etag, &head.etag) {
        (None, None) => false,
        (Some(a), Some(b)) => a != b,
        _ => true,
    };

    let last_modified_changed = match (&checkpoint.last_modified, &head.last_modified) {
        (None, None) => false,
        (Some(a), Some(b)) => a != b,
        _ => true,
    };

    let size_changed = match head.content_length {
        Some(head_size) => checkpoint.total_size != head_size,
        None => checkpoint.total_size != 0,
    };

    if etag_changed || last_modified_changed || size_changed {
        return Err(ValidationError {
            kind: ValidationErrorKind::RemoteChanged {
                etag_changed,
                last_modified_changed,
                size_changed,
            },
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests;
