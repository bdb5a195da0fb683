use std::ffi::OsStr;

pub fn file_ext(path: impl AsRef<OsStr>) -> Option<String> {
    std::path::Path::new(path.as_ref())
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_lowercase())
}

/// Maps a declared image MIME type to the extension used for the spooled
/// upload. Anything not listed here is rejected before any file is written.
pub fn image_ext_for_mime(mime: &str) -> Option<&'static str> {
    match mime {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_ext() {
        assert_eq!(file_ext("cover.JPG"), Some("jpg".to_string()));
        assert_eq!(file_ext("archive.tar.gz"), Some("gz".to_string()));
        assert_eq!(file_ext("no_extension"), None);
    }

    #[test]
    fn test_image_ext_for_mime() {
        assert_eq!(image_ext_for_mime("image/jpeg"), Some("jpg"));
        assert_eq!(image_ext_for_mime("image/webp"), Some("webp"));
        assert_eq!(image_ext_for_mime("application/pdf"), None);
    }
}
