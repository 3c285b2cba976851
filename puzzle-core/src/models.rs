use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::constants::{HIT_RADIUS_LARGE, HIT_RADIUS_MEDIUM, HIT_RADIUS_SMALL};
use crate::geometry;
use crate::locale::Language;

/// Basic two dimensional point in puzzle space (or pixels, depending on context).
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Point { x, y }
    }

    pub fn distance(self, other: Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    pub fn offset(self, by: Point) -> Point {
        Point::new(self.x + by.x, self.y + by.y)
    }

    pub fn round(self) -> Point {
        Point::new(self.x.round(), self.y.round())
    }
}

impl From<(f64, f64)> for Point {
    fn from(v: (f64, f64)) -> Self {
        Point { x: v.0, y: v.1 }
    }
}

/// Circle hit sizes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CircleSize {
    Small,
    #[default]
    Medium,
    Large,
}

impl CircleSize {
    pub fn hit_radius(self) -> f64 {
        match self {
            CircleSize::Small => HIT_RADIUS_SMALL,
            CircleSize::Medium => HIT_RADIUS_MEDIUM,
            CircleSize::Large => HIT_RADIUS_LARGE,
        }
    }
}

/// Position as it may appear in stored or downloaded puzzle files.
///
/// Puzzles written before circle sizes and polygons existed stored a bare
/// `[x, y]` pair per answer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawPosition {
    Legacy([f64; 2]),
    Polygon {
        points: Vec<Point>,
    },
    Circle {
        x: f64,
        y: f64,
        #[serde(default)]
        size: CircleSize,
    },
}

impl From<Position> for RawPosition {
    fn from(p: Position) -> Self {
        match p {
            Position::Circle { x, y, size } => RawPosition::Circle { x, y, size },
            Position::Polygon { points } => RawPosition::Polygon { points },
        }
    }
}

/// One answer location of a target, always in normalized form.
///
/// Deserialization runs through [`geometry::normalize_position`], so legacy
/// tuples never reach the hit-testing code.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Position {
    Circle { x: f64, y: f64, size: CircleSize },
    Polygon { points: Vec<Point> },
}

impl<'de> Deserialize<'de> for Position {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        RawPosition::deserialize(deserializer).map(geometry::normalize_position)
    }
}

impl Position {
    pub fn circle(x: f64, y: f64, size: CircleSize) -> Self {
        Position::Circle { x, y, size }
    }

    pub fn polygon(points: Vec<Point>) -> Self {
        Position::Polygon { points }
    }

    /// Circle centre, or vertex average for polygons.
    pub fn center(&self) -> Point {
        match self {
            Position::Circle { x, y, .. } => Point::new(*x, *y),
            Position::Polygon { points } => geometry::polygon_center(points),
        }
    }

    /// Radius around [`Position::center`] that covers the whole hit region.
    pub fn extent_radius(&self) -> f64 {
        match self {
            Position::Circle { size, .. } => size.hit_radius(),
            Position::Polygon { points } => {
                let c = geometry::polygon_center(points);
                points.iter().map(|p| p.distance(c)).fold(0.0, f64::max)
            }
        }
    }

    pub fn contains(&self, p: Point) -> bool {
        geometry::position_contains(self, p)
    }
}

/// Stable identifier `"<title>:<index>"` of one answer location.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PositionKey(String);

impl PositionKey {
    pub fn new(title: &str, index: usize) -> Self {
        PositionKey(format!("{title}:{index}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Splits the key back into target title and position index.
    /// Titles may themselves contain `:`, so the index is taken after the last one.
    pub fn parts(&self) -> Option<(&str, usize)> {
        let (title, idx) = self.0.rsplit_once(':')?;
        Some((title, idx.parse().ok()?))
    }
}

impl fmt::Display for PositionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PositionKey {
    fn from(s: &str) -> Self {
        PositionKey(s.to_string())
    }
}

/// A named item with one or more valid answer locations.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub title: String,
    #[serde(default)]
    pub positions: Vec<Position>,
}

/// Borrowed view of one position inside a puzzle, in play order.
#[derive(Clone, Debug)]
pub struct PositionRef<'a> {
    pub key: PositionKey,
    pub target: &'a Target,
    pub index: usize,
    pub position: &'a Position,
}

/// Playable puzzle: an image plus its answer set.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Puzzle {
    pub id: String,
    pub name: String,
    pub image_src: String,
    #[serde(default)]
    pub targets: Vec<Target>,
}

impl Puzzle {
    /// Every position, target by target, in array order.
    pub fn positions(&self) -> impl Iterator<Item = PositionRef<'_>> {
        self.targets.iter().flat_map(|target| {
            target
                .positions
                .iter()
                .enumerate()
                .map(move |(index, position)| PositionRef {
                    key: PositionKey::new(&target.title, index),
                    target,
                    index,
                    position,
                })
        })
    }

    pub fn total_position_count(&self) -> usize {
        self.targets.iter().map(|t| t.positions.len()).sum()
    }

    pub fn position(&self, key: &PositionKey) -> Option<PositionRef<'_>> {
        self.positions().find(|p| &p.key == key)
    }

    pub fn target(&self, title: &str) -> Option<&Target> {
        self.targets.iter().find(|t| t.title == title)
    }

    pub fn summary(&self, custom: bool) -> PuzzleSummary {
        PuzzleSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            image_src: self.image_src.clone(),
            target_count: self.targets.len(),
            position_count: self.total_position_count(),
            custom,
        }
    }
}

/// Entry of the puzzle picker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PuzzleSummary {
    pub id: String,
    pub name: String,
    pub image_src: String,
    #[serde(default)]
    pub target_count: usize,
    #[serde(default)]
    pub position_count: usize,
    #[serde(default)]
    pub custom: bool,
}

/// Persisted play progress of a single puzzle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub puzzle_id: String,
    #[serde(default)]
    pub found_positions: Vec<PositionKey>,
    #[serde(default)]
    pub completed: bool,
    pub last_played: DateTime<Utc>,
}

/// A puzzle authored in the editor, carrying its own image.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomPuzzle {
    #[serde(flatten)]
    pub puzzle: Puzzle,
    /// Embedded image as a `data:` URL.
    pub image_data: String,
    pub created_at: DateTime<Utc>,
}

impl CustomPuzzle {
    /// The puzzle with its image source pointing at the embedded data.
    pub fn playable(&self) -> Puzzle {
        Puzzle {
            image_src: self.image_data.clone(),
            ..self.puzzle.clone()
        }
    }
}

/// User preferences.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default)]
    pub language: Language,
    #[serde(default)]
    pub text_mode: bool,
}
