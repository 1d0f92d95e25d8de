//! Region routing: which detected element types get text extraction.
//!
//! The allow-set covers the textual and tabular element families of
//! document-layout models (DocLayNet label family). Pure graphics —
//! pictures, figures — never route to extraction: their content is served
//! as crops by the assembler instead. A caller-requested "bbox only" mode
//! short-circuits everything to geometry-only.

/// Element types whose content is text and therefore worth a VLM call.
/// Compared case-insensitively.
pub const EXTRACTABLE_TYPES: [&str; 10] = [
    "text",
    "caption",
    "section-header",
    "footnote",
    "formula",
    "table",
    "list-item",
    "page-header",
    "page-footer",
    "title",
];

/// Decide whether a block of the given type should go through extraction.
///
/// Always false in bbox-only mode; otherwise true exactly when `kind` is in
/// the allow-set.
pub fn should_extract(kind: &str, bbox_only: bool) -> bool {
    if bbox_only {
        return false;
    }
    EXTRACTABLE_TYPES
        .iter()
        .any(|t| t.eq_ignore_ascii_case(kind))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bbox_only_always_skips() {
        for t in EXTRACTABLE_TYPES {
            assert!(!should_extract(t, true), "{t} must be skipped in bbox-only mode");
        }
        assert!(!should_extract("picture", true));
    }

    #[test]
    fn graphics_never_extract() {
        assert!(!should_extract("picture", false));
        assert!(!should_extract("image", false));
        assert!(!should_extract("figure", false));
    }

    #[test]
    fn textual_types_extract() {
        assert!(should_extract("table", false));
        assert!(should_extract("text", false));
        assert!(should_extract("title", false));
        assert!(should_extract("footnote", false));
    }

    #[test]
    fn matching_is_case_insensitive() {
        assert!(should_extract("Table", false));
        assert!(should_extract("Section-Header", false));
        assert!(should_extract("TITLE", false));
        assert!(!should_extract("Picture", false));
    }

    #[test]
    fn unknown_types_are_skipped() {
        assert!(!should_extract("qr-code", false));
        assert!(!should_extract("", false));
    }
}
