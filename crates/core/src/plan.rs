//! Maps matches to page geometry and masking policy.

use safedoc_render::Rect;
use safedoc_rules::{placeholder, visible_tail_start};

use crate::context::RequestContext;
use crate::error::{RedactError, Result};
use crate::layout::TextLayout;
use crate::model::{FillStyle, PiiMatch, RedactionRegion, Surface};

#[derive(Debug, Clone, Copy)]
pub struct PlanParams {
    /// Margin around native boxes, in points.
    pub margin_pt: f32,
    /// Margin around raster boxes, in pixels.
    pub margin_px: f32,
}

/// Region for one match, or `None` if nothing of it lies inside `bounds`.
///
/// Full masks cover the whole span. Partial masks cover everything before
/// the visible tail and carry the placeholder for the hidden part.
pub fn plan_region(
    layout: &TextLayout,
    m: &PiiMatch,
    margin: f32,
    bounds: &Rect,
) -> Option<RedactionRegion> {
    let value = m.span.text.as_str();
    let cut = visible_tail_start(value, m.policy);
    let (hidden_end, fill, replacement) = if cut >= value.len() {
        (m.span.end, FillStyle::OpaqueBlack, None)
    } else {
        let hidden = value[..cut].trim_end();
        (
            m.span.start + hidden.len(),
            FillStyle::OpaqueBlackWithPartialText,
            Some(placeholder(hidden)),
        )
    };

    let rects: Vec<Rect> = layout
        .span_rects(m.span.start, hidden_end)
        .iter()
        .map(|r| r.inflate(margin).clamp_to(bounds))
        .filter(|r| !r.is_empty())
        .collect();
    if rects.is_empty() {
        return None;
    }

    let glyphs = match m.span.surface {
        Surface::Native => layout.sources(m.span.start, hidden_end),
        Surface::Raster(_) => Vec::new(),
    };
    Some(RedactionRegion {
        page: m.span.page,
        surface: m.span.surface,
        rects,
        fill,
        replacement,
        glyphs,
    })
}

/// Plans every match. A match that cannot be placed fails the request.
pub(crate) fn plan_regions(
    ctx: &RequestContext,
    matches: &[PiiMatch],
    params: PlanParams,
) -> Result<Vec<RedactionRegion>> {
    let mut regions = Vec::with_capacity(matches.len());
    for m in matches {
        let (layout, bounds, margin) = match m.span.surface {
            Surface::Native => {
                let page = ctx
                    .pages
                    .iter()
                    .find(|p| p.index == m.span.page)
                    .ok_or_else(|| RedactError::CorruptDocument(format!("page {} missing", m.span.page + 1)))?;
                (&page.layout, page.bounds, params.margin_pt)
            }
            Surface::Raster(index) => {
                let surface = ctx.surfaces.get(index).ok_or_else(|| {
                    RedactError::CorruptDocument(format!("surface {} missing", index))
                })?;
                (&surface.layout, surface.bounds(), params.margin_px)
            }
        };
        match plan_region(layout, m, margin, &bounds) {
            Some(region) => regions.push(region),
            None => {
                log::error!(
                    "[Plan] {} on page {} has no geometry inside the page",
                    m.pii_type.id(),
                    m.span.page + 1
                );
                return Err(RedactError::RedactionIntegrityFailure { findings: 1 });
            }
        }
    }
    log::info!("[Plan] {} region(s)", regions.len());
    Ok(regions)
}
