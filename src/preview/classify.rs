//! Extension and size based routing, decided before any body is fetched.

/// Bodies above this size are never downloaded for preview.
pub const MAX_PREVIEW_BYTES: u64 = 100 * 1024 * 1024;

const ARCHIVE_EXTENSIONS: &[&str] = &["zip", "tar", "gz", "rar"];

const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "md", "json", "xml", "html", "htm", "css", "js", "ts", "py", "r", "yaml", "yml",
    "toml", "ini", "cfg", "log", "sh", "rs", "sql", "tsv",
];

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "tif", "tiff", "svg", "bmp"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Text,
    Csv,
    Spreadsheet,
    Document,
    Image,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Archive,
    TooLarge(u64),
    Decode(Category),
    Unsupported,
}

/// Lowercase extension of a file name, empty when there is none.
/// Dot-files such as `.env` have no extension.
pub fn extension_of(name: &str) -> String {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !stem.ends_with('/') => ext.to_ascii_lowercase(),
        _ => String::new(),
    }
}

pub fn is_archive(extension: &str) -> bool {
    ARCHIVE_EXTENSIONS.contains(&extension)
}

pub fn category_of(extension: &str) -> Option<Category> {
    match extension {
        "csv" => Some(Category::Csv),
        "xlsx" | "xls" => Some(Category::Spreadsheet),
        "docx" | "doc" => Some(Category::Document),
        ext if TEXT_EXTENSIONS.contains(&ext) => Some(Category::Text),
        ext if IMAGE_EXTENSIONS.contains(&ext) => Some(Category::Image),
        _ => None,
    }
}

pub fn is_preview_supported(extension: &str) -> bool {
    category_of(extension).is_some()
}

/// First match wins: archive, then size, then extension family.
pub fn classify(extension: &str, size_bytes: u64) -> Classification {
    if is_archive(extension) {
        return Classification::Archive;
    }
    if size_bytes > MAX_PREVIEW_BYTES {
        return Classification::TooLarge(size_bytes);
    }
    match category_of(extension) {
        Some(category) => Classification::Decode(category),
        None => Classification::Unsupported,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("photo.JPG"), "jpg");
        assert_eq!(extension_of("backup.tar.gz"), "gz");
        assert_eq!(extension_of("README"), "");
        assert_eq!(extension_of(".bashrc"), "");
        assert_eq!(extension_of("trailing."), "");
    }

    #[test]
    fn test_archive_beats_everything() {
        assert_eq!(classify("zip", 1024), Classification::Archive);
        assert_eq!(classify("gz", 10 * MAX_PREVIEW_BYTES), Classification::Archive);
    }

    #[test]
    fn test_size_beats_extension() {
        assert_eq!(
            classify("txt", 200 * 1024 * 1024),
            Classification::TooLarge(200 * 1024 * 1024)
        );
        assert_eq!(
            classify("txt", MAX_PREVIEW_BYTES),
            Classification::Decode(Category::Text)
        );
    }

    #[test]
    fn test_dispatch_by_family() {
        assert_eq!(classify("json", 1), Classification::Decode(Category::Text));
        assert_eq!(classify("csv", 1), Classification::Decode(Category::Csv));
        assert_eq!(classify("xls", 1), Classification::Decode(Category::Spreadsheet));
        assert_eq!(classify("docx", 1), Classification::Decode(Category::Document));
        assert_eq!(classify("tiff", 1), Classification::Decode(Category::Image));
        assert_eq!(classify("pdf", 1), Classification::Unsupported);
        assert_eq!(classify("", 1), Classification::Unsupported);
    }

    #[test]
    fn test_preview_supported() {
        assert!(is_preview_supported("md"));
        assert!(is_preview_supported("svg"));
        assert!(!is_preview_supported("rar"));
        assert!(!is_preview_supported("exe"));
    }
}
