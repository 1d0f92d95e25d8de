//! Cross-page merge: many per-page markdown files → one document.
//!
//! Pages are discovered recursively, ordered by the page number embedded
//! in their file names (see [`crate::output::extract_page_number`]), and
//! concatenated with blank-line separators. Every embedded image
//! reference is resolved against its page's directory, copied into one
//! shared media directory, and rewritten to point at the copy.
//!
//! ## Dedup rule
//!
//! The media directory is keyed by content identity: a name that already
//! holds byte-identical content is reused without copying (re-merging the
//! same page is idempotent), while a name collision with *different*
//! content gets a `_1`, `_2`, … suffix before the extension until a free
//! name is found. Two documents can both ship an `image1.png` without one
//! clobbering the other.
//!
//! Merge is append-only: nothing already placed in the media directory is
//! ever rolled back, and a missing referenced image produces a warning
//! with the original link left untouched rather than an abort.

use crate::error::DocBlocksError;
use crate::output::page_order_key;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Markdown image links: `![alt](target)`.
static RE_IMAGE_LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(!\[[^\]]*\]\()([^)]+)(\))").unwrap());

/// Recursively find `.md` files under `input_dir`, sorted into page order.
pub fn find_markdown_files(input_dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    collect_markdown_files(input_dir, &mut files)?;
    files.sort_by_key(|p| {
        let name = p
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        page_order_key(&name)
    });
    Ok(files)
}

fn collect_markdown_files(dir: &Path, out: &mut Vec<PathBuf>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_markdown_files(&path, out)?;
        } else if path
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case("md"))
        {
            out.push(path);
        }
    }
    Ok(())
}

/// Merge the given markdown files (already in order) into one document,
/// copying referenced media into `media_dir`.
///
/// Rewritten links are prefixed with the media directory's file name, so
/// the merged document works when written next to it.
pub fn merge_files(files: &[PathBuf], media_dir: &Path) -> Result<String, DocBlocksError> {
    fs::create_dir_all(media_dir).map_err(|e| DocBlocksError::OutputWriteFailed {
        path: media_dir.to_path_buf(),
        source: e,
    })?;

    let prefix = media_dir
        .file_name()
        .map(|n| format!("{}/", n.to_string_lossy()))
        .unwrap_or_default();

    let mut parts: Vec<String> = Vec::with_capacity(files.len());
    for file in files {
        debug!("Merging {}", file.display());
        let text = fs::read_to_string(file).map_err(|e| DocBlocksError::OutputWriteFailed {
            path: file.clone(),
            source: e,
        })?;
        let page_dir = file.parent().unwrap_or_else(|| Path::new("."));
        parts.push(rewrite_image_links(&text, page_dir, media_dir, &prefix));
    }

    Ok(parts.join("\n\n"))
}

/// Merge every markdown file under `input_dir` into `output_md`, with a
/// shared `media_dir` next to it.
///
/// Returns the number of files merged.
pub fn merge_directory(
    input_dir: &Path,
    output_md: &Path,
    media_dir: &Path,
) -> Result<usize, DocBlocksError> {
    let files = find_markdown_files(input_dir).map_err(|e| DocBlocksError::OutputWriteFailed {
        path: input_dir.to_path_buf(),
        source: e,
    })?;
    info!("Found {} markdown files", files.len());

    let merged = merge_files(&files, media_dir)?;

    if let Some(parent) = output_md.parent() {
        fs::create_dir_all(parent).map_err(|e| DocBlocksError::OutputWriteFailed {
            path: output_md.to_path_buf(),
            source: e,
        })?;
    }
    fs::write(output_md, merged).map_err(|e| DocBlocksError::OutputWriteFailed {
        path: output_md.to_path_buf(),
        source: e,
    })?;

    info!("Merged markdown written to {}", output_md.display());
    Ok(files.len())
}

/// Rewrite every image link in `md`: copy the referenced file from
/// `page_dir` into `media_dir` and point the link at the copy.
///
/// Web URLs are left alone; a missing file is warned about and its link
/// left untouched.
fn rewrite_image_links(md: &str, page_dir: &Path, media_dir: &Path, prefix: &str) -> String {
    RE_IMAGE_LINK
        .replace_all(md, |caps: &regex::Captures<'_>| {
            let target = caps[2].trim();
            if target.starts_with("http://") || target.starts_with("https://") {
                return caps[0].to_string();
            }
            let src = page_dir.join(target);
            if !src.is_file() {
                warn!("Image not found: {}", src.display());
                return caps[0].to_string();
            }
            match place_media(&src, media_dir) {
                Ok(name) => format!("{}{}{}{}", &caps[1], prefix, name, &caps[3]),
                Err(e) => {
                    warn!("Failed to copy {}: {}", src.display(), e);
                    caps[0].to_string()
                }
            }
        })
        .into_owned()
}

/// Place `src` into `media_dir` under a collision-free name and return
/// that name.
///
/// Reuses an existing byte-identical file; otherwise appends `_N` before
/// the extension until a free name is found.
fn place_media(src: &Path, media_dir: &Path) -> io::Result<String> {
    let file_name = src
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "no file name"))?
        .to_string_lossy()
        .into_owned();
    let stem = src
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_name.clone());
    let extension = src.extension().map(|e| e.to_string_lossy().into_owned());

    let mut candidate = file_name;
    let mut counter = 1;
    loop {
        let dst = media_dir.join(&candidate);
        if !dst.exists() {
            fs::copy(src, &dst)?;
            debug!("Copied media: {} -> {}", src.display(), dst.display());
            return Ok(candidate);
        }
        if same_contents(src, &dst)? {
            return Ok(candidate);
        }
        candidate = match &extension {
            Some(ext) => format!("{stem}_{counter}.{ext}"),
            None => format!("{stem}_{counter}"),
        };
        counter += 1;
    }
}

/// Byte-identity check, length first so mismatched files never get read.
fn same_contents(a: &Path, b: &Path) -> io::Result<bool> {
    if fs::metadata(a)?.len() != fs::metadata(b)?.len() {
        return Ok(false);
    }
    Ok(fs::read(a)? == fs::read(b)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write(path: &Path, content: &[u8]) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn finds_and_orders_markdown_by_page_number() {
        let dir = tempdir().unwrap();
        for name in ["doc_page_10.md", "doc_page_2.md", "nested/doc_page_1.md"] {
            write(&dir.path().join(name), b"x");
        }
        let files = find_markdown_files(dir.path()).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["doc_page_1.md", "doc_page_2.md", "doc_page_10.md"]);
    }

    #[test]
    fn same_named_different_images_get_distinct_files() {
        let dir = tempdir().unwrap();
        let media = dir.path().join("media");

        let page_a = dir.path().join("a/page_1.md");
        write(&page_a, b"![img](img.png)");
        write(&dir.path().join("a/img.png"), b"AAAA");

        let page_b = dir.path().join("b/page_2.md");
        write(&page_b, b"![img](img.png)");
        write(&dir.path().join("b/img.png"), b"BBBB");

        let merged = merge_files(&[page_a, page_b], &media).unwrap();

        assert!(merged.contains("![img](media/img.png)"));
        assert!(merged.contains("![img](media/img_1.png)"));
        assert_eq!(fs::read(media.join("img.png")).unwrap(), b"AAAA");
        assert_eq!(fs::read(media.join("img_1.png")).unwrap(), b"BBBB");
    }

    #[test]
    fn identical_image_referenced_twice_is_not_duplicated() {
        let dir = tempdir().unwrap();
        let media = dir.path().join("media");

        let page = dir.path().join("p/page_1.md");
        write(&page, b"![a](img.png)\n\n![b](img.png)");
        write(&dir.path().join("p/img.png"), b"SAME");

        // merge the same page twice — still one copy
        let merged = merge_files(&[page.clone(), page], &media).unwrap();

        let entries: Vec<_> = fs::read_dir(&media).unwrap().collect();
        assert_eq!(entries.len(), 1);
        assert!(!merged.contains("img_1.png"));
    }

    #[test]
    fn missing_image_keeps_link_untouched() {
        let dir = tempdir().unwrap();
        let media = dir.path().join("media");

        let page = dir.path().join("page_1.md");
        write(&page, b"before ![gone](nowhere.png) after");

        let merged = merge_files(&[page], &media).unwrap();
        assert!(merged.contains("![gone](nowhere.png)"));
    }

    #[test]
    fn web_urls_are_left_alone() {
        let dir = tempdir().unwrap();
        let media = dir.path().join("media");
        let page = dir.path().join("page_1.md");
        write(&page, b"![fig](https://example.org/fig.png)");

        let merged = merge_files(&[page], &media).unwrap();
        assert!(merged.contains("(https://example.org/fig.png)"));
    }

    #[test]
    fn pages_join_with_blank_line() {
        let dir = tempdir().unwrap();
        let media = dir.path().join("media");
        let p1 = dir.path().join("page_1.md");
        let p2 = dir.path().join("page_2.md");
        write(&p1, b"first");
        write(&p2, b"second");

        let merged = merge_files(&[p1, p2], &media).unwrap();
        assert_eq!(merged, "first\n\nsecond");
    }

    #[test]
    fn merge_directory_writes_output() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("pages");
        write(&input.join("doc_page_1.md"), b"![i](pic.png)");
        write(&input.join("pic.png"), b"PNGDATA");

        let out = dir.path().join("out/merged.md");
        let media = dir.path().join("out/media");
        let count = merge_directory(&input, &out, &media).unwrap();

        assert_eq!(count, 1);
        let merged = fs::read_to_string(&out).unwrap();
        assert!(merged.contains("![i](media/pic.png)"));
        assert!(media.join("pic.png").is_file());
    }
}
