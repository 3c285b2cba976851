//! Conversion between puzzle space (0..=1000 per axis) and screen pixels.
//!
//! The image is laid out "contain" style inside its container, then scaled by
//! the user zoom about the container centre and shifted by the pan offset.
//! Pixel coordinates share the frame of `container` (usually client
//! coordinates of the page).

use serde::{Deserialize, Serialize};

use crate::constants::{MAX_ZOOM, MIN_ZOOM, PUZZLE_SPACE};
use crate::models::Point;

/// Axis-aligned rectangle in pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub const fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Rect {
            left,
            top,
            width,
            height,
        }
    }

    pub fn right(&self) -> f64 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }

    pub fn center(&self) -> Point {
        Point::new(self.left + self.width / 2.0, self.top + self.height / 2.0)
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.left && p.x <= self.right() && p.y >= self.top && p.y <= self.bottom()
    }

    fn is_usable(&self) -> bool {
        self.width > 0.0 && self.height > 0.0 && self.width.is_finite() && self.height.is_finite()
    }
}

/// Layout state needed to map between pixels and puzzle space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub container: Rect,
    /// Natural width / height of the image. Unknown (0) until the image decodes.
    pub image_aspect: f64,
    pub zoom: f64,
    pub pan: Point,
}

impl Default for Viewport {
    fn default() -> Self {
        Viewport {
            container: Rect::default(),
            image_aspect: 0.0,
            zoom: MIN_ZOOM,
            pan: Point::default(),
        }
    }
}

impl Viewport {
    pub fn new(container: Rect, image_aspect: f64) -> Self {
        Viewport {
            container,
            image_aspect,
            ..Viewport::default()
        }
    }

    pub fn from_image_size(container: Rect, natural_w: f64, natural_h: f64) -> Self {
        let aspect = if natural_h > 0.0 {
            natural_w / natural_h
        } else {
            0.0
        };
        Viewport::new(container, aspect)
    }

    /// False until both the container and the image dimensions are known.
    pub fn is_ready(&self) -> bool {
        self.container.is_usable() && self.image_aspect > 0.0 && self.image_aspect.is_finite()
    }

    /// Contain-fit rectangle of the image, ignoring zoom and pan.
    pub fn fitted_rect(&self) -> Option<Rect> {
        if !self.is_ready() {
            return None;
        }
        let c = self.container;
        let container_aspect = c.width / c.height;
        let rect = if container_aspect > self.image_aspect {
            // Height-constrained: letterbox left and right.
            let w = c.height * self.image_aspect;
            Rect::new(c.left + (c.width - w) / 2.0, c.top, w, c.height)
        } else {
            // Width-constrained (ties land here): letterbox top and bottom.
            let h = c.width / self.image_aspect;
            Rect::new(c.left, c.top + (c.height - h) / 2.0, c.width, h)
        };
        Some(rect)
    }

    /// On-screen rectangle of the image after zoom and pan.
    pub fn image_rect(&self) -> Option<Rect> {
        let fit = self.fitted_rect()?;
        let c = self.container.center();
        Some(Rect::new(
            c.x + (fit.left - c.x) * self.zoom + self.pan.x,
            c.y + (fit.top - c.y) * self.zoom + self.pan.y,
            fit.width * self.zoom,
            fit.height * self.zoom,
        ))
    }

    /// Pixel to puzzle space. `None` when the point misses the displayed image.
    pub fn to_puzzle_space(&self, px: f64, py: f64) -> Option<Point> {
        let rect = self.image_rect()?;
        let p = Point::new(px, py);
        if !rect.contains(p) {
            return None;
        }
        Some(Point::new(
            (px - rect.left) / rect.width * PUZZLE_SPACE,
            (py - rect.top) / rect.height * PUZZLE_SPACE,
        ))
    }

    /// Integer puzzle-space coordinates, as stored by the editor.
    pub fn to_puzzle_space_rounded(&self, px: f64, py: f64) -> Option<Point> {
        self.to_puzzle_space(px, py).map(Point::round)
    }

    /// Puzzle space to pixels. `offset` (puzzle units) is added before projecting,
    /// which is how hint circles are drawn off-centre.
    pub fn to_pixel_space(&self, p: Point, offset: Option<Point>) -> Option<Point> {
        let rect = self.image_rect()?;
        let p = p.offset(offset.unwrap_or_default());
        Some(Point::new(
            rect.left + p.x / PUZZLE_SPACE * rect.width,
            rect.top + p.y / PUZZLE_SPACE * rect.height,
        ))
    }

    /// Length in puzzle units converted with the horizontal scale.
    pub fn puzzle_len_to_pixels(&self, len: f64) -> Option<f64> {
        self.image_rect().map(|r| len / PUZZLE_SPACE * r.width)
    }

    pub fn set_container(&mut self, container: Rect) {
        self.container = container;
    }

    pub fn set_image_size(&mut self, natural_w: f64, natural_h: f64) {
        self.image_aspect = if natural_h > 0.0 {
            natural_w / natural_h
        } else {
            0.0
        };
    }

    /// Sets the zoom about the container centre. Returning to 1x recentres the image.
    pub fn set_zoom(&mut self, zoom: f64) {
        self.zoom = zoom.clamp(MIN_ZOOM, MAX_ZOOM);
        if self.zoom <= MIN_ZOOM {
            self.pan = Point::default();
        }
    }

    /// Multiplies the zoom while keeping whatever is under `anchor` (pixels) in place.
    pub fn zoom_at(&mut self, factor: f64, anchor: Point) {
        let (Some(before), Some(fit)) = (self.image_rect(), self.fitted_rect()) else {
            return;
        };
        let zoom = (self.zoom * factor).clamp(MIN_ZOOM, MAX_ZOOM);
        if zoom <= MIN_ZOOM {
            self.set_zoom(zoom);
            return;
        }
        let u = (anchor.x - before.left) / before.width;
        let v = (anchor.y - before.top) / before.height;
        let left = anchor.x - u * fit.width * zoom;
        let top = anchor.y - v * fit.height * zoom;
        let c = self.container.center();
        self.zoom = zoom;
        self.pan = Point::new(
            left - (c.x + (fit.left - c.x) * zoom),
            top - (c.y + (fit.top - c.y) * zoom),
        );
    }

    pub fn pan_by(&mut self, dx: f64, dy: f64) {
        if self.zoom > MIN_ZOOM {
            self.pan = Point::new(self.pan.x + dx, self.pan.y + dy);
        }
    }

    pub fn reset_view(&mut self) {
        self.zoom = MIN_ZOOM;
        self.pan = Point::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f64 = 1e-9;

    fn approx(a: Point, b: Point) -> bool {
        (a.x - b.x).abs() < EPSILON && (a.y - b.y).abs() < EPSILON
    }

    fn wide() -> Viewport {
        // 1000x500 container, square image
        Viewport::new(Rect::new(0.0, 0.0, 1000.0, 500.0), 1.0)
    }

    #[test]
    fn height_constrained_letterboxes_sides() {
        let rect = wide().image_rect().unwrap();
        assert_eq!(rect, Rect::new(250.0, 0.0, 500.0, 500.0));
    }

    #[test]
    fn width_constrained_letterboxes_top_and_bottom() {
        let vp = Viewport::new(Rect::new(0.0, 0.0, 400.0, 800.0), 2.0);
        assert_eq!(vp.image_rect().unwrap(), Rect::new(0.0, 300.0, 400.0, 200.0));
    }

    #[test]
    fn equal_aspect_takes_width_branch_and_fills_container() {
        let vp = Viewport::new(Rect::new(10.0, 20.0, 800.0, 600.0), 800.0 / 600.0);
        let rect = vp.image_rect().unwrap();
        assert!((rect.left - 10.0).abs() < EPSILON);
        assert!((rect.width - 800.0).abs() < EPSILON);
        assert!((rect.top - 20.0).abs() < 1e-6);
        assert!((rect.height - 600.0).abs() < 1e-6);
    }

    #[test]
    fn corners_map_to_puzzle_extremes() {
        let vp = wide();
        assert!(approx(vp.to_puzzle_space(250.0, 0.0).unwrap(), Point::new(0.0, 0.0)));
        assert!(approx(
            vp.to_puzzle_space(750.0, 500.0).unwrap(),
            Point::new(1000.0, 1000.0)
        ));
        assert!(approx(vp.to_puzzle_space(500.0, 250.0).unwrap(), Point::new(500.0, 500.0)));
    }

    #[test]
    fn letterbox_clicks_are_rejected() {
        let vp = wide();
        assert_eq!(vp.to_puzzle_space(100.0, 100.0), None);
        assert_eq!(vp.to_puzzle_space(900.0, 250.0), None);
    }

    #[test]
    fn unknown_image_size_maps_nothing() {
        let vp = Viewport::new(Rect::new(0.0, 0.0, 100.0, 100.0), 0.0);
        assert_eq!(vp.to_puzzle_space(50.0, 50.0), None);
        assert_eq!(vp.to_pixel_space(Point::new(1.0, 1.0), None), None);
    }

    #[test]
    fn rounded_mapping_for_the_editor() {
        let vp = wide();
        assert_eq!(
            vp.to_puzzle_space_rounded(250.7, 0.3).unwrap(),
            Point::new(1.0, 1.0)
        );
    }

    #[test]
    fn pixel_space_is_the_inverse() {
        let mut vp = wide();
        vp.zoom_at(2.5, Point::new(600.0, 100.0));
        vp.pan_by(-40.0, 15.0);
        for p in [Point::new(0.0, 0.0), Point::new(123.0, 877.0), Point::new(500.0, 500.0)] {
            let px = vp.to_pixel_space(p, None).unwrap();
            let back = vp.to_puzzle_space(px.x, px.y).unwrap();
            assert!(approx(back, p), "{back:?} != {p:?}");
        }
    }

    #[test]
    fn offset_is_applied_in_puzzle_units() {
        let vp = wide();
        let base = vp.to_pixel_space(Point::new(500.0, 500.0), None).unwrap();
        let shifted = vp
            .to_pixel_space(Point::new(500.0, 500.0), Some(Point::new(100.0, -50.0)))
            .unwrap();
        // 500px image width for 1000 units
        assert!(approx(shifted, Point::new(base.x + 50.0, base.y - 25.0)));
    }

    #[test]
    fn zoom_scales_about_container_centre() {
        let mut vp = wide();
        vp.set_zoom(2.0);
        assert_eq!(vp.image_rect().unwrap(), Rect::new(0.0, -250.0, 1000.0, 1000.0));
        assert!(approx(vp.to_puzzle_space(500.0, 250.0).unwrap(), Point::new(500.0, 500.0)));
    }

    #[test]
    fn zoom_at_keeps_anchor_fixed() {
        let mut vp = wide();
        let anchor = Point::new(300.0, 100.0);
        let before = vp.to_puzzle_space(anchor.x, anchor.y).unwrap();
        vp.zoom_at(3.0, anchor);
        assert!((vp.zoom - 3.0).abs() < EPSILON);
        let after = vp.to_puzzle_space(anchor.x, anchor.y).unwrap();
        assert!(approx(before, after));
    }

    #[test]
    fn zoom_is_clamped_and_unzoom_recentres() {
        let mut vp = wide();
        vp.zoom_at(100.0, Point::new(300.0, 100.0));
        assert_eq!(vp.zoom, MAX_ZOOM);
        vp.zoom_at(0.001, Point::new(300.0, 100.0));
        assert_eq!(vp.zoom, MIN_ZOOM);
        assert_eq!(vp.pan, Point::default());
    }

    #[test]
    fn panning_needs_zoom() {
        let mut vp = wide();
        vp.pan_by(10.0, 10.0);
        assert_eq!(vp.pan, Point::default());
        vp.set_zoom(2.0);
        vp.pan_by(10.0, -5.0);
        assert_eq!(vp.pan, Point::new(10.0, -5.0));
        vp.reset_view();
        assert_eq!(vp.image_rect().unwrap(), Rect::new(250.0, 0.0, 500.0, 500.0));
    }
}
