//! Syntactic validation of video references.
//!
//! Only the shape of the locator is checked here. Reachability is probed
//! by the worker right before the upstream call.

use url::Url;

use crate::error::InputError;

/// Container formats accepted for analysis.
pub const SUPPORTED_FORMATS: &[&str] = &["mp4", "avi", "mov", "mkv", "webm"];

/// Validate a video URL: http(s) scheme, a host, and a supported extension.
pub fn validate_reference(reference: &str) -> Result<Url, InputError> {
    let url = Url::parse(reference.trim()).map_err(|e| InputError::Malformed(e.to_string()))?;

    match url.scheme() {
        "http" | "https" => {}
        other => return Err(InputError::UnsupportedScheme(other.to_string())),
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(InputError::MissingHost);
    }

    let format = video_format(&url).unwrap_or_default();
    if !SUPPORTED_FORMATS.contains(&format.as_str()) {
        return Err(InputError::UnsupportedFormat {
            format,
            supported: SUPPORTED_FORMATS.join(", "),
        });
    }

    Ok(url)
}

/// Lowercased file extension of the URL path, ignoring the query string.
pub fn video_format(url: &Url) -> Option<String> {
    let last_segment = url.path_segments()?.last()?;
    let (_, ext) = last_segment.rsplit_once('.')?;
    if ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_references() {
        assert!(validate_reference("http://host/a.mp4").is_ok());
        assert!(validate_reference("https://cdn.example.com/videos/clip.MOV?token=abc").is_ok());
        assert!(validate_reference("http://localhost:8000/videos/sample.webm").is_ok());
    }

    #[test]
    fn test_rejects_non_http_schemes() {
        assert_eq!(
            validate_reference("file:///C:/videos/sample.mp4"),
            Err(InputError::UnsupportedScheme("file".into()))
        );
        assert!(matches!(
            validate_reference("ftp://host/a.mp4"),
            Err(InputError::UnsupportedScheme(_))
        ));
    }

    #[test]
    fn test_rejects_malformed() {
        assert!(matches!(
            validate_reference("not a url"),
            Err(InputError::Malformed(_))
        ));
    }

    #[test]
    fn test_rejects_unsupported_format() {
        match validate_reference("http://host/a.gif") {
            Err(InputError::UnsupportedFormat { format, .. }) => assert_eq!(format, "gif"),
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(matches!(
            validate_reference("http://host/video"),
            Err(InputError::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn test_video_format_ignores_query() {
        let url = Url::parse("http://host/path/a.MKV?x=1.mp4").unwrap();
        assert_eq!(video_format(&url).as_deref(), Some("mkv"));
    }
}
