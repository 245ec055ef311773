use crate::models::VideoReference;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Ordered matcher strategies; the first capture wins. Identifiers are
    /// exactly 11 characters of `[0-9A-Za-z_-]`.
    static ref ID_MATCHERS: Vec<Regex> = vec![
        // Query-parameter or path-segment form: `?v=<id>` or `/<id>`
        // followed by a delimiter or the end of the URL.
        Regex::new(r"(?:v=|/)([0-9A-Za-z_-]{11})(?:[?&/]|$)").unwrap(),
        // Short-link form: `youtu.be/<id>`.
        Regex::new(r"youtu\.be/([0-9A-Za-z_-]{11})").unwrap(),
    ];
}

/// Derives a thumbnail reference for a video URL. No network access: the
/// thumbnail is computed from the extracted identifier alone, and a URL with
/// no extractable identifier keeps a `None` thumbnail so callers fall back
/// to a bare link.
pub fn resolve_video(url: &str) -> VideoReference {
    VideoReference {
        original_url: url.to_string(),
        thumbnail_url: extract_video_id(url).map(|id| thumbnail_url(&id)),
    }
}

fn extract_video_id(url: &str) -> Option<String> {
    if url.is_empty() {
        return None;
    }
    ID_MATCHERS
        .iter()
        .find_map(|pattern| pattern.captures(url))
        .map(|caps| caps[1].to_string())
}

fn thumbnail_url(id: &str) -> String {
    format!("https://img.youtube.com/vi/{id}/hqdefault.jpg")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_id_from_query_parameter_form() {
        let reference = resolve_video("https://www.youtube.com/watch?v=dQw4w9WgXcQ");
        assert_eq!(
            reference.thumbnail_url.as_deref(),
            Some("https://img.youtube.com/vi/dQw4w9WgXcQ/hqdefault.jpg")
        );
    }

    #[test]
    fn extracts_id_from_short_link_form() {
        let reference = resolve_video("https://youtu.be/dQw4w9WgXcQ");
        assert_eq!(
            reference.thumbnail_url.as_deref(),
            Some("https://img.youtube.com/vi/dQw4w9WgXcQ/hqdefault.jpg")
        );
    }

    #[test]
    fn id_followed_by_query_string_still_matches() {
        let reference = resolve_video("https://youtu.be/dQw4w9WgXcQ?t=42");
        assert_eq!(
            reference.thumbnail_url.as_deref(),
            Some("https://img.youtube.com/vi/dQw4w9WgXcQ/hqdefault.jpg")
        );
    }

    #[test]
    fn unextractable_url_falls_back_to_bare_link() {
        let reference = resolve_video("https://example.com/some-video");
        assert_eq!(reference.original_url, "https://example.com/some-video");
        assert!(reference.thumbnail_url.is_none());
    }

    #[test]
    fn short_identifier_does_not_match() {
        // Ten characters, one short of a valid id.
        let reference = resolve_video("https://youtu.be/dQw4w9WgXc");
        assert!(reference.thumbnail_url.is_none());
    }

    #[test]
    fn empty_url_yields_no_thumbnail() {
        let reference = resolve_video("");
        assert_eq!(reference.original_url, "");
        assert!(reference.thumbnail_url.is_none());
    }
}
