//! Content-type resolution from file extensions.

/// Content type used when the extension is unknown or absent.
pub const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Guess the content type for `path` from its extension.
pub fn resolve(path: &str) -> String {
    mime_guess::from_path(path)
        .first_raw()
        .unwrap_or(FALLBACK_CONTENT_TYPE)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_known_extensions() {
        assert_eq!(resolve("avatars/me.png"), "image/png");
        assert_eq!(resolve("docs/report.PDF"), "application/pdf");
        assert_eq!(resolve("index.html"), "text/html");
    }

    #[test]
    fn falls_back_for_unknown_or_missing_extension() {
        assert_eq!(resolve("blob.zzzunknown"), FALLBACK_CONTENT_TYPE);
        assert_eq!(resolve("README"), FALLBACK_CONTENT_TYPE);
        assert_eq!(resolve(""), FALLBACK_CONTENT_TYPE);
    }
}
