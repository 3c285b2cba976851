//! Thumbnail crop regions and the cache for rendered thumbnails.

use std::collections::HashMap;

use serde::Serialize;

use crate::constants::{PUZZLE_SPACE, THUMBNAIL_HALF_EXTENT};
use crate::models::{Point, Position};

/// Pixel rectangle inside the source image.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct CropRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Square-ish crop around a puzzle-space point, shifted (not shrunk) to stay
/// inside an image of `image_w` x `image_h` pixels.
pub fn crop_region(center: Point, image_w: u32, image_h: u32) -> CropRegion {
    let scale_x = f64::from(image_w) / PUZZLE_SPACE;
    let scale_y = f64::from(image_h) / PUZZLE_SPACE;
    // Square in pixels, sized from the shorter image side.
    let side = (THUMBNAIL_HALF_EXTENT * 2.0 * scale_x.min(scale_y)).round().max(1.0) as u32;
    let width = side.min(image_w);
    let height = side.min(image_h);
    let place = |c: f64, len: u32, limit: u32| -> u32 {
        let start = (c - f64::from(len) / 2.0).round().max(0.0) as u32;
        start.min(limit - len)
    };
    CropRegion {
        x: place(center.x * scale_x, width, image_w),
        y: place(center.y * scale_y, height, image_h),
        width,
        height,
    }
}

/// Crop region for a position's centre.
pub fn crop_region_for(position: &Position, image_w: u32, image_h: u32) -> CropRegion {
    crop_region(position.center(), image_w, image_h)
}

/// Rendered thumbnails keyed by image source and target title.
///
/// Owned by whoever renders the found list; drop or [`clear`](Self::clear) it
/// when the puzzle changes.
#[derive(Debug)]
pub struct ThumbnailCache<T> {
    entries: HashMap<(String, String), T>,
}

impl<T> Default for ThumbnailCache<T> {
    fn default() -> Self {
        ThumbnailCache {
            entries: HashMap::new(),
        }
    }
}

impl<T> ThumbnailCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, image_src: &str, title: &str) -> Option<&T> {
        self.entries.get(&(image_src.to_string(), title.to_string()))
    }

    pub fn insert(&mut self, image_src: &str, title: &str, value: T) {
        self.entries
            .insert((image_src.to_string(), title.to_string()), value);
    }

    /// Cached value, or the result of `make` (cached only on success).
    pub fn get_or_try_insert_with<E>(
        &mut self,
        image_src: &str,
        title: &str,
        make: impl FnOnce() -> Result<T, E>,
    ) -> Result<&T, E> {
        let key = (image_src.to_string(), title.to_string());
        if !self.entries.contains_key(&key) {
            let value = make()?;
            self.entries.insert(key.clone(), value);
        }
        Ok(&self.entries[&key])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
