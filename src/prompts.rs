//! Prompts for VLM-based region and page extraction.
//!
//! Centralising every prompt here serves two purposes:
//!
//! 1. **Single source of truth** — changing the extraction behaviour (e.g.
//!    tightening the JSON envelope instruction) requires editing exactly
//!    one place.
//!
//! 2. **Testability** — unit tests can import and inspect prompts directly
//!    without spinning up a real VLM, making prompt regressions easy to
//!    catch.

/// Prompt for the region-markdown extraction kind: one pre-detected crop
/// in, one strict JSON envelope out.
///
/// The envelope requirement exists so the response is machine-parseable
/// without heuristics; the fence-stripping pass in
/// [`crate::pipeline::extract`] exists for the models that ignore rule 5
/// anyway.
pub const REGION_MARKDOWN_PROMPT: &str = r#"You are an expert document transcriber. You are given a cropped region of a document page image. Convert the region's visible content to clean Markdown.

Follow these rules precisely:

1. Preserve ALL visible text completely and accurately, in reading order.
2. Convert tables to GFM pipe format; if a table is too complex for pipe format, use HTML table markup.
3. Render mathematical expressions using LaTeX: $inline$ and $$display$$.
4. Use **bold** and *italic* to match the visual emphasis.
5. Respond with EXACTLY this JSON object and nothing else:
   {"markdown": "<the markdown string>"}
6. Do NOT wrap the response in code fences. Do NOT add commentary."#;

/// Prompt for the structured-objects extraction kind: the model both
/// discovers elements and extracts their text, for pipelines that run
/// without a separate layout segmenter.
pub const PAGE_OBJECTS_PROMPT: &str = r#"Detect all distinct text blocks and key visual elements in the document page image. Group text lines that logically, semantically, and visually belong together into a single element.

For each detected element provide:

1. "label": a concise descriptive label (e.g. "title", "text", "list-item", "table", "picture").
2. "bbox_2d": the bounding box [x1, y1, x2, y2] in image pixels that encompasses the entire element.
3. "text": the complete text content of the element, formatted as Markdown. Omit for pictures.
4. "confidence": a confidence score for the detection, from 0.0 to 1.0.

Respond with EXACTLY this JSON object and nothing else:
{"objects": [{"label": "...", "bbox_2d": [x1, y1, x2, y2], "text": "...", "confidence": 0.0}]}

Do NOT wrap the response in code fences. Do NOT add commentary."#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_prompt_demands_the_envelope() {
        assert!(REGION_MARKDOWN_PROMPT.contains(r#"{"markdown":"#));
        assert!(REGION_MARKDOWN_PROMPT.contains("code fences"));
    }

    #[test]
    fn objects_prompt_uses_two_corner_boxes() {
        assert!(PAGE_OBJECTS_PROMPT.contains("[x1, y1, x2, y2]"));
        assert!(PAGE_OBJECTS_PROMPT.contains(r#""objects""#));
    }
}
