use safedoc_rules::{Detection, PiiDetector};

use crate::context::RequestContext;
use crate::layout::TextLayout;
use crate::model::{PiiMatch, Surface, TextSpan};

fn matches_in(
    layout: &TextLayout,
    detector: &PiiDetector,
    page: usize,
    surface: Surface,
    out: &mut Vec<PiiMatch>,
) {
    if layout.is_empty() {
        return;
    }
    for mut detection in detector.detect(&layout.text) {
        let Detection {
            pii_type,
            start,
            end,
            confidence,
            validated,
            ..
        } = detection;
        let confidence = match surface {
            Surface::Native => confidence,
            Surface::Raster(_) => confidence * layout.min_confidence(start, end),
        };
        out.push(PiiMatch {
            pii_type,
            span: TextSpan {
                text: std::mem::take(&mut detection.text),
                start,
                end,
                page,
                surface,
                rects: layout.span_rects(start, end),
            },
            validated,
            confidence,
            policy: pii_type.mask_policy(),
        });
    }
}

/// Runs the detector over every native layout and OCR surface of the request.
pub(crate) fn detect_matches(ctx: &RequestContext, detector: &PiiDetector) -> Vec<PiiMatch> {
    let mut out = Vec::new();
    for page in &ctx.pages {
        matches_in(&page.layout, detector, page.index, Surface::Native, &mut out);
    }
    for (index, surface) in ctx.surfaces.iter().enumerate() {
        matches_in(&surface.layout, detector, surface.page, Surface::Raster(index), &mut out);
    }

    let native = out.iter().filter(|m| m.span.surface == Surface::Native).count();
    log::info!(
        "[Detect] {} match(es): {} native, {} optical",
        out.len(),
        native,
        out.len() - native
    );
    for m in &out {
        log::debug!(
            "[Detect] page {} {} at {}..{} ({:.2})",
            m.span.page + 1,
            m.pii_type.id(),
            m.span.start,
            m.span.end,
            m.confidence
        );
    }
    out
}
