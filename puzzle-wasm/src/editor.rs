use chrono::{DateTime, Utc};
use puzzle_core::constants::MIN_POLYGON_POINTS;
use puzzle_core::editor::{PolygonBuilder, PuzzleDraft};
use puzzle_core::mapping::{Rect, Viewport};
use puzzle_core::models::{CircleSize, CustomPuzzle, Point, Position, PositionKey};
use puzzle_core::{PuzzleError, marker_color};
use serde::Serialize;
use wasm_bindgen::prelude::*;

use crate::utils::{js_error, to_js};

fn err(e: PuzzleError) -> JsValue {
    js_error(&e.to_string())
}

fn parse_size(size: &str) -> Result<CircleSize, JsValue> {
    match size {
        "small" => Ok(CircleSize::Small),
        "medium" => Ok(CircleSize::Medium),
        "large" => Ok(CircleSize::Large),
        other => Err(js_error(&format!("unknown circle size {other:?}"))),
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ShapeView {
    key: String,
    color: &'static str,
    /// Circle centre or polygon centre, pixels.
    center: Point,
    /// Pixel radius for circles.
    radius: Option<f64>,
    /// Pixel vertices for polygons.
    points: Vec<Point>,
}

/// Authoring surface: a draft plus the view it is drawn in.
#[wasm_bindgen]
pub struct Editor {
    draft: PuzzleDraft,
    polygon: Option<PolygonBuilder>,
    viewport: Viewport,
}

#[wasm_bindgen]
impl Editor {
    #[wasm_bindgen(constructor)]
    pub fn new(name: &str) -> Editor {
        Editor::from_draft(PuzzleDraft::new(name))
    }

    pub fn set_name(&mut self, name: &str) {
        self.draft.set_name(name);
    }

    pub fn set_image(&mut self, data_url: String) {
        self.draft.set_image(data_url);
    }

    pub fn set_container(&mut self, left: f64, top: f64, width: f64, height: f64) {
        self.viewport
            .set_container(Rect::new(left, top, width, height));
    }

    pub fn set_image_size(&mut self, natural_w: f64, natural_h: f64) {
        self.viewport.set_image_size(natural_w, natural_h);
    }

    pub fn add_target(&mut self, title: &str) -> Result<(), JsValue> {
        self.draft.add_target(title).map_err(err)
    }

    pub fn rename_target(&mut self, from: &str, to: &str) -> Result<(), JsValue> {
        self.draft.rename_target(from, to).map_err(err)
    }

    pub fn remove_target(&mut self, title: &str) -> Result<(), JsValue> {
        self.draft.remove_target(title).map(|_| ()).map_err(err)
    }

    /// Adds a circle at a pixel location; returns its position key.
    pub fn add_circle(&mut self, title: &str, x: f64, y: f64, size: &str) -> Result<String, JsValue> {
        let at = self.to_puzzle(x, y)?;
        let key = self
            .draft
            .add_circle(title, at, parse_size(size)?)
            .map_err(err)?;
        Ok(key.to_string())
    }

    pub fn begin_polygon(&mut self) {
        self.polygon = Some(PolygonBuilder::new());
    }

    /// Adds a vertex to the polygon being traced; returns the vertex count.
    pub fn polygon_point(&mut self, x: f64, y: f64) -> Result<usize, JsValue> {
        let at = self.to_puzzle(x, y)?;
        let builder = self.polygon.get_or_insert_with(PolygonBuilder::new);
        builder.push(at);
        Ok(builder.points().len())
    }

    pub fn undo_point(&mut self) -> usize {
        match self.polygon.as_mut() {
            Some(b) => {
                b.undo();
                b.points().len()
            }
            None => 0,
        }
    }

    pub fn can_close_polygon(&self) -> bool {
        self.polygon.as_ref().is_some_and(PolygonBuilder::can_close)
    }

    /// Closes the traced polygon under `title`. A polygon that is too small
    /// stays open so more points can be added.
    pub fn close_polygon(&mut self, title: &str) -> Result<String, JsValue> {
        let builder = self
            .polygon
            .take()
            .ok_or_else(|| js_error("no polygon in progress"))?;
        if !builder.can_close() {
            self.polygon = Some(builder);
            return Err(js_error(&format!(
                "a polygon needs at least {MIN_POLYGON_POINTS} points"
            )));
        }
        let key = self.draft.add_polygon(title, builder).map_err(err)?;
        Ok(key.to_string())
    }

    pub fn cancel_polygon(&mut self) {
        self.polygon = None;
    }

    pub fn set_size(&mut self, key: &str, size: &str) -> Result<(), JsValue> {
        let size = parse_size(size)?;
        self.draft
            .set_size(&PositionKey::from(key), size)
            .map_err(err)
    }

    pub fn move_position(&mut self, key: &str, x: f64, y: f64) -> Result<(), JsValue> {
        let to = self.to_puzzle(x, y)?;
        self.draft
            .move_position(&PositionKey::from(key), to)
            .map_err(err)
    }

    pub fn remove_position(&mut self, key: &str) -> Result<(), JsValue> {
        self.draft
            .remove_position(&PositionKey::from(key))
            .map(|_| ())
            .map_err(err)
    }

    /// Every authored position in pixel space, for drawing.
    pub fn shapes(&self) -> Result<JsValue, JsValue> {
        let mut out = Vec::new();
        for (i, target) in self.draft.targets().iter().enumerate() {
            for (idx, position) in target.positions.iter().enumerate() {
                let Some(center) = self.viewport.to_pixel_space(position.center(), None) else {
                    continue;
                };
                let (radius, points) = match position {
                    Position::Circle { size, .. } => {
                        (self.viewport.puzzle_len_to_pixels(size.hit_radius()), Vec::new())
                    }
                    Position::Polygon { points } => (
                        None,
                        points
                            .iter()
                            .filter_map(|p| self.viewport.to_pixel_space(*p, None))
                            .collect(),
                    ),
                };
                out.push(ShapeView {
                    key: PositionKey::new(&target.title, idx).to_string(),
                    color: marker_color(i),
                    center,
                    radius,
                    points,
                });
            }
        }
        to_js(&out)
    }

    pub fn validate(&self) -> Result<(), JsValue> {
        self.draft.validate().map(|_| ()).map_err(err)
    }
}

impl Editor {
    fn from_draft(draft: PuzzleDraft) -> Editor {
        Editor {
            draft,
            polygon: None,
            viewport: Viewport::default(),
        }
    }

    pub fn from_custom(custom: &CustomPuzzle) -> Editor {
        Editor::from_draft(PuzzleDraft::from_custom(custom))
    }

    pub fn finish(&self, now: DateTime<Utc>) -> Result<CustomPuzzle, PuzzleError> {
        self.draft.finish(now)
    }

    fn to_puzzle(&self, x: f64, y: f64) -> Result<Point, JsValue> {
        self.viewport
            .to_puzzle_space(x, y)
            .ok_or_else(|| js_error("point is outside the image"))
    }
}
