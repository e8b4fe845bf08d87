use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle stored as min/max corners.
///
/// The coordinate space is up to the caller: PDF user space (y up) for
/// native pages, pixel space (y down) for raster surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl Rect {
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self {
            x0: x0.min(x1),
            y0: y0.min(y1),
            x1: x0.max(x1),
            y1: y0.max(y1),
        }
    }

    pub fn from_xywh(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self::new(x, y, x + w, y + h)
    }

    /// Bounding box of a set of points.
    pub fn from_points(points: &[(f32, f32)]) -> Option<Self> {
        let (first, rest) = points.split_first()?;
        let mut r = Rect::new(first.0, first.1, first.0, first.1);
        for (x, y) in rest {
            r.x0 = r.x0.min(*x);
            r.y0 = r.y0.min(*y);
            r.x1 = r.x1.max(*x);
            r.y1 = r.y1.max(*y);
        }
        Some(r)
    }

    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    pub fn is_empty(&self) -> bool {
        !(self.width() > 0.0 && self.height() > 0.0)
    }

    pub fn union(&self, other: &Rect) -> Rect {
        Rect {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }

    pub fn inflate(&self, margin: f32) -> Rect {
        Rect {
            x0: self.x0 - margin,
            y0: self.y0 - margin,
            x1: self.x1 + margin,
            y1: self.y1 + margin,
        }
    }

    /// Intersection with `bounds`; empty if they do not overlap.
    pub fn clamp_to(&self, bounds: &Rect) -> Rect {
        let x0 = self.x0.max(bounds.x0);
        let y0 = self.y0.max(bounds.y0);
        Rect {
            x0,
            y0,
            x1: self.x1.min(bounds.x1).max(x0),
            y1: self.y1.min(bounds.y1).max(y0),
        }
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.x0 < other.x1 && other.x0 < self.x1 && self.y0 < other.y1 && other.y0 < self.y1
    }

    pub fn contains(&self, other: &Rect) -> bool {
        self.x0 <= other.x0 && self.y0 <= other.y0 && self.x1 >= other.x1 && self.y1 >= other.y1
    }

    pub fn center(&self) -> (f32, f32) {
        ((self.x0 + self.x1) / 2.0, (self.y0 + self.y1) / 2.0)
    }

    pub fn scale(&self, factor: f32) -> Rect {
        Rect::new(
            self.x0 * factor,
            self.y0 * factor,
            self.x1 * factor,
            self.y1 * factor,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_normalizes_corners() {
        let r = Rect::new(10.0, 20.0, 0.0, 5.0);
        assert_eq!(r, Rect { x0: 0.0, y0: 5.0, x1: 10.0, y1: 20.0 });
    }

    #[test]
    fn test_union_and_inflate() {
        let a = Rect::from_xywh(0.0, 0.0, 10.0, 10.0);
        let b = Rect::from_xywh(20.0, 5.0, 5.0, 10.0);
        let u = a.union(&b);
        assert_eq!(u, Rect::new(0.0, 0.0, 25.0, 15.0));
        assert!(u.inflate(2.0).contains(&u));
    }

    #[test]
    fn test_clamp() {
        let page = Rect::new(0.0, 0.0, 100.0, 100.0);
        let r = Rect::new(-5.0, 90.0, 20.0, 110.0).clamp_to(&page);
        assert_eq!(r, Rect::new(0.0, 90.0, 20.0, 100.0));
        assert!(Rect::new(200.0, 200.0, 210.0, 210.0).clamp_to(&page).is_empty());
    }

    #[test]
    fn test_from_points() {
        let r = Rect::from_points(&[(3.0, 4.0), (-1.0, 8.0), (2.0, 0.0)]).unwrap();
        assert_eq!(r, Rect::new(-1.0, 0.0, 3.0, 8.0));
        assert!(Rect::from_points(&[]).is_none());
    }
}
