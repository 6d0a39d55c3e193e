//! URL modeling and filename derivation.
//!
//! Derives safe local filenames from response headers or the request URL,
//! sanitized for Linux filesystems.

mod content_disposition;
mod path;
mod sanitize;

pub use content_disposition::parse_content_disposition_filename;
pub use path::{filename_from_url_path, first_filename_like_query_param, huggingface_query, query_param};
pub use sanitize::sanitize_filename_for_linux;

/// Filename substituted when none of the resolution steps yield anything usable.
pub const DEFAULT_FILENAME: &str = "download_file";

/// Query keys tried, in order, when the URL path itself gives no usable name.
const FALLBACK_QUERY_KEYS: &[&str] = &["filename", "name", "file", "title", "download"];

/// Derives a safe filename for saving a download.
///
/// Resolution order, stopping at the first candidate produced:
///
/// 1. `Content-Disposition` header (quoted `filename=`, then bare `filename=`,
///    then RFC 5987 `filename*=`).
/// 2. If the host belongs to the HuggingFace CDN, the `response-content-disposition`
///    query parameter, parsed the same way as (1).
/// 3. The URL path's last component, if it contains a `.` and is under 100 bytes.
/// 4. Known query keys (`filename`, `name`, `file`, `title`, `download`) whose
///    value contains a `.`.
/// 5. The URL path's last component, unconditionally.
/// 6. The literal `download_file`.
///
/// Whatever candidate wins is sanitized for the local filesystem before being
/// returned.
pub fn derive_filename(url: &str, content_disposition: Option<&str>) -> String {
    let candidate = content_disposition
        .and_then(parse_content_disposition_filename)
        .filter(|s| !s.is_empty())
        .or_else(|| {
            huggingface_query(url)
                .as_deref()
                .and_then(parse_content_disposition_filename)
                .filter(|s| !s.is_empty())
        })
        .or_else(|| {
            filename_from_url_path(url).filter(|name| name.contains('.') && name.len() < 100)
        })
        .or_else(|| first_filename_like_query_param(url, FALLBACK_QUERY_KEYS))
        .or_else(|| filename_from_url_path(url));

    let raw = match candidate {
        Some(c) => c,
        None => return DEFAULT_FILENAME.to_string(),
    };

    let sanitized = sanitize_filename_for_linux(&raw);
    if sanitized.is_empty() || sanitized == "." || sanitized == ".." {
        DEFAULT_FILENAME.to_string()
    } else {
        sanitized
    }
}

/// Appends a numeric disambiguator (`name (2).ext`) to `filename` until
/// `exists` reports no collision, for separating unrelated tasks that would
/// otherwise resolve to the same on-disk name.
///
/// `exists` should return `true` only for files owned by a *different* task;
/// the caller is responsible for excluding the current task's own paths.
pub fn uniquify_filename(filename: &str, mut exists: impl FnMut(&str) -> bool) -> String {
    if !exists(filename) {
        return filename.to_string();
    }

    let (stem, ext) = match filename.rfind('.') {
        Some(i) if i > 0 => (&filename[..i], &filename[i..]),
        _ => (filename, ""),
    };

    for n in 2u32.. {
        let candidate = format!("{stem} ({n}){ext}");
        if !exists(&candidate) {
            return candidate;
        }
    }
    unreachable!("u32 counter exhausted")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_filename_from_url_path() {
        assert_eq!(
            derive_filename("https://example.com/archive.zip", None),
            "archive.zip"
        );
        assert_eq!(
            derive_filename("https://cdn.example.com/path/to/debian-12.iso", None),
            "debian-12.iso"
        );
    }

    #[test]
    fn derive_filename_from_content_disposition() {
        assert_eq!(
            derive_filename(
                "https://example.com/",
                Some("attachment; filename=\"report.pdf\"")
            ),
            "report.pdf"
        );
        assert_eq!(
            derive_filename(
                "https://example.com/x",
                Some("attachment; filename=simple.bin")
            ),
            "simple.bin"
        );
    }

    #[test]
    fn derive_filename_content_disposition_overrides_url() {
        assert_eq!(
            derive_filename(
                "https://example.com/archive.zip",
                Some("attachment; filename=\"real-name.tar.gz\"")
            ),
            "real-name.tar.gz"
        );
    }

    #[test]
    fn derive_filename_huggingface_query_used_when_no_content_disposition_header() {
        let url = "https://cdn-lfs.hf.co/repo/resolve/main/model.bin?response-content-disposition=attachment%3B%20filename%3D%22model.safetensors%22";
        assert_eq!(derive_filename(url, None), "model.safetensors");
    }

    #[test]
    fn derive_filename_fallback_query_key_when_path_has_no_dot() {
        assert_eq!(
            derive_filename("https://example.com/download?file=report.pdf", None),
            "report.pdf"
        );
    }

    #[test]
    fn derive_filename_unconditional_path_when_no_dot_anywhere() {
        assert_eq!(
            derive_filename("https://example.com/release-candidate", None),
            "release-candidate"
        );
    }

    #[test]
    fn derive_filename_empty_url_path_fallback() {
        assert_eq!(
            derive_filename("https://example.com/", None),
            "download_file"
        );
        assert_eq!(derive_filename("https://example.com", None), "download_file");
    }

    #[test]
    fn derive_filename_reserved_names_fallback() {
        assert_eq!(
            derive_filename("https://example.com/.", None),
            "download_file"
        );
        assert_eq!(
            derive_filename("https://example.com/..", None),
            "download_file"
        );
    }

    #[test]
    fn uniquify_returns_original_when_no_collision() {
        assert_eq!(uniquify_filename("report.pdf", |_| false), "report.pdf");
    }

    #[test]
    fn uniquify_appends_counter_on_collision() {
        let taken = ["report.pdf", "report (2).pdf"];
        let result = uniquify_filename("report.pdf", |name| taken.contains(&name));
        assert_eq!(result, "report (3).pdf");
    }

    #[test]
    fn uniquify_handles_extensionless_names() {
        let result = uniquify_filename("README", |name| name == "README");
        assert_eq!(result, "README (2)");
    }
}
