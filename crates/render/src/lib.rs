//! Geometry, raster painting and page rasterization.

mod geometry;
mod paint;
mod rasterize;

pub use geometry::Rect;
pub use paint::{paint_regions, pixel_box, uncovered_pixels, BLACK};
pub use rasterize::{NoRasterizer, PageRasterizer, PdfiumRasterizer};

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("rasterizer unavailable: {0}")]
    Unavailable(String),
    #[error("render failed: {0}")]
    Render(String),
}
