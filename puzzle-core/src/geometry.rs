//! Hit testing in puzzle space.
//!
//! Everything here is pure. Callers validate authored shapes up front with
//! [`validate_position`]/[`validate_puzzle`]; the hit tests assume valid input.

use std::collections::HashSet;

use crate::constants::{MIN_POLYGON_POINTS, PUZZLE_SPACE};
use crate::error::PuzzleError;
use crate::models::{CircleSize, Point, Position, Puzzle, RawPosition};

/// Normalize any accepted position representation.
///
/// Legacy `[x, y]` tuples become medium circles. Already normalized positions
/// come back unchanged, so the function is idempotent.
pub fn normalize_position(raw: impl Into<RawPosition>) -> Position {
    match raw.into() {
        RawPosition::Legacy([x, y]) => Position::Circle {
            x,
            y,
            size: CircleSize::Medium,
        },
        RawPosition::Circle { x, y, size } => Position::Circle { x, y, size },
        RawPosition::Polygon { points } => Position::Polygon { points },
    }
}

/// Ray casting: count crossings of a horizontal ray running right from `(x, y)`.
///
/// Points lying exactly on an edge may land on either side.
pub fn is_point_in_polygon(x: f64, y: f64, polygon: &[Point]) -> bool {
    let n = polygon.len();
    if n == 0 {
        return false;
    }
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (xi, yi) = (polygon[i].x, polygon[i].y);
        let (xj, yj) = (polygon[j].x, polygon[j].y);
        // (yi > y) != (yj > y) guarantees yi != yj
        let crosses = ((yi > y) != (yj > y)) && (x < (xj - xi) * (y - yi) / (yj - yi) + xi);
        if crosses {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Strict distance test: a click exactly on the rim is a miss.
pub fn is_point_in_circle(p: Point, center: Point, size: CircleSize) -> bool {
    p.distance(center) < size.hit_radius()
}

/// Vertex average (not the area centroid). Used for hint placement only.
/// An empty polygon centres on the origin.
pub fn polygon_center(polygon: &[Point]) -> Point {
    let n = polygon.len().max(1) as f64;
    let (sx, sy) = polygon
        .iter()
        .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
    Point::new(sx / n, sy / n)
}

pub fn position_contains(position: &Position, p: Point) -> bool {
    match position {
        Position::Circle { x, y, size } => is_point_in_circle(p, Point::new(*x, *y), *size),
        Position::Polygon { points } => is_point_in_polygon(p.x, p.y, points),
    }
}

fn in_puzzle_space(p: Point) -> bool {
    (0.0..=PUZZLE_SPACE).contains(&p.x) && (0.0..=PUZZLE_SPACE).contains(&p.y)
}

/// Authoring-time check of a single position.
pub fn validate_position(position: &Position) -> Result<(), PuzzleError> {
    match position {
        Position::Circle { x, y, .. } => {
            let c = Point::new(*x, *y);
            if !in_puzzle_space(c) {
                return Err(PuzzleError::invalid(format!(
                    "circle centre ({x}, {y}) lies outside 0..={PUZZLE_SPACE}"
                )));
            }
        }
        Position::Polygon { points } => {
            if points.len() < MIN_POLYGON_POINTS {
                return Err(PuzzleError::invalid(format!(
                    "polygon needs at least {MIN_POLYGON_POINTS} points, got {}",
                    points.len()
                )));
            }
            if let Some(p) = points.iter().find(|p| !in_puzzle_space(**p)) {
                return Err(PuzzleError::invalid(format!(
                    "polygon vertex ({}, {}) lies outside 0..={PUZZLE_SPACE}",
                    p.x, p.y
                )));
            }
        }
    }
    Ok(())
}

/// Authoring/import check of a whole puzzle.
///
/// Titles must be unique and non-empty because position keys are built from them.
pub fn validate_puzzle(puzzle: &Puzzle) -> Result<(), PuzzleError> {
    if puzzle.id.trim().is_empty() {
        return Err(PuzzleError::invalid("puzzle id is empty"));
    }
    if puzzle.targets.is_empty() {
        return Err(PuzzleError::invalid("puzzle has no targets"));
    }
    let mut titles = HashSet::new();
    for target in &puzzle.targets {
        let title = target.title.trim();
        if title.is_empty() {
            return Err(PuzzleError::invalid("target title is empty"));
        }
        if !titles.insert(title) {
            return Err(PuzzleError::invalid(format!(
                "duplicate target title `{title}`"
            )));
        }
        if target.positions.is_empty() {
            return Err(PuzzleError::invalid(format!(
                "target `{title}` has no positions"
            )));
        }
        for position in &target.positions {
            validate_position(position)
                .map_err(|e| PuzzleError::invalid(format!("target `{title}`: {e}")))?;
        }
    }
    Ok(())
}
