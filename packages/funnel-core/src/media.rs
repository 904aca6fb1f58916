/// Attachment classification helpers.
use std::path::Path;

use crate::types::FileKind;

/// Map a file extension to its MIME content type.
pub fn content_type_for_ext(ext: Option<&str>) -> &'static str {
    match ext {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("svg") => "image/svg+xml",
        Some("pdf") => "application/pdf",
        Some("doc") => "application/msword",
        Some("docx") => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        Some("xls") => "application/vnd.ms-excel",
        Some("xlsx") => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        Some("csv") => "text/csv",
        Some("txt") | Some("md") => "text/plain",
        Some("mp4") => "video/mp4",
        _ => "application/octet-stream",
    }
}

/// MIME type of an attachment, guessed from its name when the uploader sent none.
pub fn resolve_mime(file_name: &str, declared: &str) -> String {
    if !declared.trim().is_empty() {
        return declared.trim().to_ascii_lowercase();
    }
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    content_type_for_ext(ext.as_deref()).to_string()
}

/// Classify a MIME type: images, office/text documents, everything else.
pub fn file_kind(mime: &str) -> FileKind {
    let mime = mime.to_ascii_lowercase();
    if mime.starts_with("image/") {
        return FileKind::Image;
    }
    let is_document = mime == "application/pdf"
        || mime.starts_with("text/")
        || mime == "application/msword"
        || mime == "application/vnd.ms-excel"
        || mime == "application/vnd.ms-powerpoint"
        || mime.starts_with("application/vnd.openxmlformats-officedocument.")
        || mime.starts_with("application/vnd.oasis.opendocument.");
    if is_document {
        FileKind::Document
    } else {
        FileKind::Other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_kind() {
        assert_eq!(file_kind("image/png"), FileKind::Image);
        assert_eq!(file_kind("IMAGE/JPEG"), FileKind::Image);
        assert_eq!(file_kind("application/pdf"), FileKind::Document);
        assert_eq!(file_kind("text/csv"), FileKind::Document);
        assert_eq!(
            file_kind("application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"),
            FileKind::Document
        );
        assert_eq!(file_kind("video/mp4"), FileKind::Other);
        assert_eq!(file_kind("application/zip"), FileKind::Other);
    }

    #[test]
    fn test_resolve_mime_falls_back_to_extension() {
        assert_eq!(resolve_mime("contract.PDF", ""), "application/pdf");
        assert_eq!(resolve_mime("logo.png", "Image/PNG"), "image/png");
        assert_eq!(resolve_mime("archive", ""), "application/octet-stream");
    }
}
