//! Filename extraction from URL path and query.

use super::content_disposition::percent_decode;

/// Extracts the last path segment from a URL, percent-decoded, for use as a
/// filename hint.
///
/// Returns `None` if the URL cannot be parsed or the path is empty/root.
pub fn filename_from_url_path(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let path = parsed.path();
    let segment = path.split('/').filter(|s| !s.is_empty()).last()?;
    if segment.is_empty() || segment == "." || segment == ".." {
        return None;
    }
    percent_decode(segment).ok().filter(|s| !s.is_empty())
}

/// Returns the decoded `response-content-disposition` query value, but only
/// when the host contains the `hf.co` substring used by the HuggingFace CDN.
pub fn huggingface_query(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    if !host.contains("hf.co") {
        return None;
    }
    parsed
        .query_pairs()
        .find(|(k, _)| k == "response-content-disposition")
        .map(|(_, v)| v.into_owned())
}

/// Looks up a query parameter by name in the URL's query string.
pub fn query_param(url: &str, key: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    parsed
        .query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

/// Tries each of `keys` in order, returning the first present query value
/// that contains a `.` (i.e. looks like it carries a file extension).
pub fn first_filename_like_query_param(url: &str, keys: &[&str]) -> Option<String> {
    for key in keys {
        if let Some(v) = query_param(url, key) {
            if v.contains('.') {
                return Some(v);
            }
        }
    }
    None
}
