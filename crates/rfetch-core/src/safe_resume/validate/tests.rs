//! Tests for safe-resume validation.

use std::path::PathBuf;

use crate::checkpoint::{CheckpointRecord, TaskStatus};
use crate::fetch_head::HeadResult;

use super::{validate_for_resume, ValidationErrorKind};

fn checkpoint(total_size: u64, etag: Option<&str>, last_modified: Option<&str>) -> CheckpointRecord {
    CheckpointRecord {
        url: "https://example.com/file.bin".to_string(),
        total_size,
        downloaded_size: 0,
        segments: vec![],
        status: TaskStatus::Paused,
        destination_directory: PathBuf::from("/tmp"),
        filename: "file.bin".to_string(),
        etag: etag.map(String::from),
        last_modified: last_modified.map(String::from),
        proxy_list_snapshot: vec![],
        worker_count: 4,
        single_stream_latched: false,
        total_active_time_secs: 0,
    }
}

fn head_result(
    content_length: Option<u64>,
    etag: Option<&str>,
    last_modified: Option<&str>,
) -> HeadResult {
    HeadResult {
        content_length,
        accept_ranges: true,
        etag: etag.map(String::from),
        last_modified: last_modified.map(String::from),
        content_disposition: None,
    }
}

#[test]
fn no_stored_metadata_ok() {
    let checkpoint = checkpoint(0, None, None);
    let head = head_result(
        Some(1000),
        Some("e1"),
        Some("Wed, 21 Oct 2015 07:28:00 GMT"),
    );
    assert!(validate_for_resume(&checkpoint, &head).is_ok());
}

#[test]
fn same_etag_and_size_ok() {
    let checkpoint = checkpoint(1000, Some("e1"), Some("Wed, 21 Oct 2015 07:28:00 GMT"));
    let head = head_result(
        Some(1000),
        Some("e1"),
        Some("Wed, 21 Oct 2015 07:28:00 GMT"),
    );
    assert!(validate_for_resume(&checkpoint, &head).is_ok());
}

#[test]
fn etag_changed_err() {
    let checkpoint = checkpoint(1000, Some("e1"), Some("Wed, 21 Oct 2015 07:28:00 GMT"));
    let head = head_result(
        Some(1000),
        Some("e2"),
        Some("Wed, 21 Oct 2015 07:28:00 GMT"),
    );
    let r = validate_for_resume(&checkpoint, &head);
    assert!(r.is_err());
    let e = r.unwrap_err();
    assert!(matches!(
        e.kind,
        ValidationErrorKind::RemoteChanged {
            etag_changed: true,
            ..
        }
    ));
}

#[test]
fn size_changed_err() {
    let checkpoint = checkpoint(1000, Some("e1"), None);
    let head = head_result(Some(2000), Some("e1"), None);
    let r = validate_for_resume(&checkpoint, &head);
    assert!(r.is_err());
    let e = r.unwrap_err();
    assert!(matches!(
        e.kind,
        ValidationErrorKind::RemoteChanged {
            size_changed: true,
            ..
        }
    ));
}

#[test]
fn last_modified_changed_err() {
    let checkpoint = checkpoint(1000, None, Some("Wed, 21 Oct 2015 07:28:00 GMT"));
    let head = head_result(Some(1000), None, Some("Thu, 22 Oct 2015 08:00:00 GMT"));
    let r = validate_for_resume(&checkpoint, &head);
    assert!(r.is_err());
    let e = r.unwrap_err();
    assert!(matches!(
        e.kind,
        ValidationErrorKind::RemoteChanged {
            last_modified_changed: true,
            ..
        }
    ));
}

#[test]
fn head_missing_content_length_treated_as_size_mismatch_when_checkpoint_has_size() {
    let checkpoint = checkpoint(1000, Some("e1"), None);
    let head = head_result(None, Some("e1"), None);
    let r = validate_for_resume(&checkpoint, &head);
    assert!(r.is_err());
}
