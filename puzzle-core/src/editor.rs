//! Authoring drafts.
//!
//! The host page owns the pointer interaction; it converts clicks to
//! puzzle-space with [`Viewport`](crate::mapping::Viewport) and drives a
//! [`PuzzleDraft`]. Coordinates are rounded and clamped on the way in so a
//! finished draft always passes validation of its positions.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::constants::{MIN_POLYGON_POINTS, PUZZLE_SPACE};
use crate::error::PuzzleError;
use crate::geometry::validate_puzzle;
use crate::models::{CircleSize, CustomPuzzle, Point, Position, PositionKey, Puzzle, Target};

fn snap(p: Point) -> Point {
    let p = p.round();
    Point::new(p.x.clamp(0.0, PUZZLE_SPACE), p.y.clamp(0.0, PUZZLE_SPACE))
}

/// Polygon being traced point by point.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PolygonBuilder {
    points: Vec<Point>,
}

impl PolygonBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, p: Point) {
        self.points.push(snap(p));
    }

    pub fn undo(&mut self) -> Option<Point> {
        self.points.pop()
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn can_close(&self) -> bool {
        self.points.len() >= MIN_POLYGON_POINTS
    }

    pub fn close(self) -> Result<Position, PuzzleError> {
        if !self.can_close() {
            return Err(PuzzleError::invalid(format!(
                "a polygon needs at least {MIN_POLYGON_POINTS} points, got {}",
                self.points.len()
            )));
        }
        Ok(Position::polygon(self.points))
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PuzzleDraft {
    id: Option<String>,
    name: String,
    image_data: String,
    targets: Vec<Target>,
    created_at: Option<DateTime<Utc>>,
}

impl PuzzleDraft {
    pub fn new(name: &str) -> Self {
        PuzzleDraft {
            name: name.trim().to_string(),
            ..Self::default()
        }
    }

    /// Reopens a saved custom puzzle; finishing keeps its id.
    pub fn from_custom(custom: &CustomPuzzle) -> Self {
        PuzzleDraft {
            id: Some(custom.puzzle.id.clone()),
            name: custom.puzzle.name.clone(),
            image_data: custom.image_data.clone(),
            targets: custom.puzzle.targets.clone(),
            created_at: Some(custom.created_at),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = name.trim().to_string();
    }

    pub fn image_data(&self) -> &str {
        &self.image_data
    }

    pub fn set_image(&mut self, data_url: String) {
        self.image_data = data_url;
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    fn target_mut(&mut self, title: &str) -> Result<&mut Target, PuzzleError> {
        self.targets
            .iter_mut()
            .find(|t| t.title == title)
            .ok_or_else(|| PuzzleError::not_found("target", title))
    }

    fn check_title(&self, title: &str) -> Result<String, PuzzleError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(PuzzleError::invalid("target title is empty"));
        }
        if self.targets.iter().any(|t| t.title == title) {
            return Err(PuzzleError::invalid(format!("duplicate target title {title:?}")));
        }
        Ok(title.to_string())
    }

    pub fn add_target(&mut self, title: &str) -> Result<(), PuzzleError> {
        let title = self.check_title(title)?;
        self.targets.push(Target {
            title,
            positions: Vec::new(),
        });
        Ok(())
    }

    /// Renaming changes the keys of every position under the target.
    pub fn rename_target(&mut self, from: &str, to: &str) -> Result<(), PuzzleError> {
        if from == to.trim() {
            return Ok(());
        }
        let to = self.check_title(to)?;
        self.target_mut(from)?.title = to;
        Ok(())
    }

    pub fn remove_target(&mut self, title: &str) -> Result<Target, PuzzleError> {
        let i = self
            .targets
            .iter()
            .position(|t| t.title == title)
            .ok_or_else(|| PuzzleError::not_found("target", title))?;
        Ok(self.targets.remove(i))
    }

    fn push_position(&mut self, title: &str, position: Position) -> Result<PositionKey, PuzzleError> {
        let target = self.target_mut(title)?;
        target.positions.push(position);
        let key = PositionKey::new(&target.title, target.positions.len() - 1);
        debug!(%key, "position added");
        Ok(key)
    }

    pub fn add_circle(
        &mut self,
        title: &str,
        at: Point,
        size: CircleSize,
    ) -> Result<PositionKey, PuzzleError> {
        let at = snap(at);
        self.push_position(title, Position::circle(at.x, at.y, size))
    }

    pub fn add_polygon(
        &mut self,
        title: &str,
        polygon: PolygonBuilder,
    ) -> Result<PositionKey, PuzzleError> {
        // Check the target before consuming the builder's points.
        self.target_mut(title)?;
        let position = polygon.close()?;
        self.push_position(title, position)
    }

    fn position_mut(&mut self, key: &PositionKey) -> Result<&mut Position, PuzzleError> {
        let unknown = || PuzzleError::UnknownPosition(key.to_string());
        let (title, index) = key.parts().ok_or_else(unknown)?;
        self.targets
            .iter_mut()
            .find(|t| t.title == title)
            .and_then(|t| t.positions.get_mut(index))
            .ok_or_else(unknown)
    }

    /// Only circles have a size.
    pub fn set_size(&mut self, key: &PositionKey, new_size: CircleSize) -> Result<(), PuzzleError> {
        match self.position_mut(key)? {
            Position::Circle { size, .. } => {
                *size = new_size;
                Ok(())
            }
            Position::Polygon { .. } => Err(PuzzleError::invalid(format!(
                "{key} is a polygon and has no size"
            ))),
        }
    }

    /// Moves a position so its centre lands on `to`. Polygon points are
    /// translated together and kept inside puzzle-space.
    pub fn move_position(&mut self, key: &PositionKey, to: Point) -> Result<(), PuzzleError> {
        let to = snap(to);
        match self.position_mut(key)? {
            Position::Circle { x, y, .. } => {
                *x = to.x;
                *y = to.y;
            }
            Position::Polygon { points } => {
                let from = crate::geometry::polygon_center(points);
                let by = Point::new(to.x - from.x, to.y - from.y);
                for p in points.iter_mut() {
                    *p = snap(p.offset(by));
                }
            }
        }
        Ok(())
    }

    /// Removes one position; later positions of the target shift down.
    pub fn remove_position(&mut self, key: &PositionKey) -> Result<Position, PuzzleError> {
        let unknown = || PuzzleError::UnknownPosition(key.to_string());
        let (title, index) = key.parts().ok_or_else(unknown)?;
        let target = self
            .targets
            .iter_mut()
            .find(|t| t.title == title)
            .filter(|t| index < t.positions.len())
            .ok_or_else(unknown)?;
        Ok(target.positions.remove(index))
    }

    /// The draft as a puzzle, if it is complete.
    pub fn validate(&self) -> Result<Puzzle, PuzzleError> {
        let puzzle = Puzzle {
            id: self.id.clone().unwrap_or_else(|| "draft".to_string()),
            name: self.name.clone(),
            image_src: String::new(),
            targets: self.targets.clone(),
        };
        if puzzle.name.is_empty() {
            return Err(PuzzleError::invalid("puzzle name is empty"));
        }
        validate_puzzle(&puzzle)?;
        Ok(puzzle)
    }

    pub fn finish(&self, now: DateTime<Utc>) -> Result<CustomPuzzle, PuzzleError> {
        let mut puzzle = self.validate()?;
        if self.image_data.is_empty() {
            return Err(PuzzleError::invalid("puzzle has no image"));
        }
        puzzle.id = match &self.id {
            Some(id) => id.clone(),
            None => format!("custom-{}-{}", slug(&self.name), now.timestamp()),
        };
        Ok(CustomPuzzle {
            puzzle,
            image_data: self.image_data.clone(),
            created_at: self.created_at.unwrap_or(now),
        })
    }
}

/// Lowercase ASCII slug; anything else becomes a single `-`.
pub fn slug(name: &str) -> String {
    let mut out = String::new();
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.is_empty() && !out.ends_with('-') {
            out.push('-');
        }
    }
    let out = out.trim_end_matches('-');
    if out.is_empty() {
        "puzzle".to_string()
    } else {
        out.to_string()
    }
}

/// Parses and validates a puzzle manifest.
pub fn import_puzzle(json: &str) -> Result<Puzzle, PuzzleError> {
    let puzzle: Puzzle =
        serde_json::from_str(json).map_err(|e| PuzzleError::invalid(e.to_string()))?;
    validate_puzzle(&puzzle)?;
    Ok(puzzle)
}
