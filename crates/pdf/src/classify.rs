use serde::{Deserialize, Serialize};

use crate::text::PageText;

/// Path operator count above which a textless page is treated as outlined text.
pub const PATH_DRAWN_THRESHOLD: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PageContentType {
    /// Shows text through text operators
    Text,
    /// Mostly vector paths, possibly text converted to outlines
    PathDrawn,
    /// Only images, typically a scan
    ImageBased,
    Mixed,
    Empty,
}

pub fn page_content_type(page: &PageText) -> PageContentType {
    let has_text = !page.glyphs.is_empty();
    let has_images = !page.images.is_empty() || page.inline_images > 0;
    let has_paths = page.path_ops > 0;

    log::debug!(
        "[ContentType] glyphs={}, path_ops={}, images={}",
        page.glyphs.len(),
        page.path_ops,
        page.images.len() + page.inline_images
    );

    match (has_text, has_images, has_paths) {
        (false, false, false) => PageContentType::Empty,
        (false, true, false) => PageContentType::ImageBased,
        (false, false, true) if page.path_ops > PATH_DRAWN_THRESHOLD => PageContentType::PathDrawn,
        (false, false, true) => PageContentType::Empty,
        (true, false, _) => PageContentType::Text,
        _ => PageContentType::Mixed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::extract_content;
    use lopdf::content::{Content, Operation};
    use lopdf::Document;

    #[test]
    fn test_path_drawn_page() {
        let doc = Document::with_version("1.5");
        let mut operations = Vec::new();
        for i in 0..=PATH_DRAWN_THRESHOLD {
            operations.push(Operation::new("l", vec![(i as i64).into(), 0.into()]));
        }
        let page = extract_content(&doc, None, Content { operations });
        assert_eq!(page_content_type(&page), PageContentType::PathDrawn);
    }

    #[test]
    fn test_empty_page() {
        let doc = Document::with_version("1.5");
        let page = extract_content(&doc, None, Content { operations: vec![] });
        assert_eq!(page_content_type(&page), PageContentType::Empty);
    }
}
