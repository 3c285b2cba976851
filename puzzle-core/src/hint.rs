//! Progressive hints.
//!
//! Each request for the same unresolved position narrows the hint circle
//! (250 → 125 → 62 units). The circle centre is randomly offset from the
//! answer, but never so far that any part of the answer's hit region falls
//! outside the circle.

use std::collections::BTreeSet;
use std::f64::consts::TAU;

use rand::Rng;
use serde::Serialize;
use tracing::debug;

use crate::constants::{HINT_INITIAL_RADIUS, HINT_MAX_LEVEL, HINT_MIN_RADIUS, PUZZLE_SPACE};
use crate::models::{Point, PositionKey, PositionRef, Puzzle};

/// How a fresh hint picks among the unfound positions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum HintSelection {
    /// First unfound position in target/position order.
    #[default]
    FirstUnfound,
    /// Uniformly random unfound position.
    Random,
}

/// Escalation state carried between hint requests.
#[derive(Clone, Debug, PartialEq)]
pub struct HintState {
    pub target: String,
    pub position_index: usize,
    pub level: u32,
    /// Hint centre relative to the answer's centre, in puzzle units.
    pub center_offset: Point,
}

impl HintState {
    pub fn key(&self) -> PositionKey {
        PositionKey::new(&self.target, self.position_index)
    }
}

/// A hint ready to be drawn.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Hint {
    pub key: PositionKey,
    pub level: u32,
    /// Displayed radius in puzzle units.
    pub radius: f64,
    pub target_center: Point,
    pub center_offset: Point,
    /// Identifies this hint for its expiry timer.
    pub generation: u64,
}

impl Hint {
    pub fn center(&self) -> Point {
        self.target_center.offset(self.center_offset)
    }
}

/// `max(HINT_MIN_RADIUS, floor(HINT_INITIAL_RADIUS / 2^level))`.
pub fn hint_radius(level: u32) -> f64 {
    let halvings = level.min(30) as i32;
    (HINT_INITIAL_RADIUS / 2f64.powi(halvings))
        .floor()
        .max(HINT_MIN_RADIUS)
}

/// Random hint-centre offset for an answer at `target` covering `extent` units.
///
/// The offset is first drawn inside `radius - extent`, then the absolute
/// centre is pulled at least `radius` away from the canvas edges. If the edge
/// clamp would push the answer out of the circle, containment wins and the
/// offset is shortened back to `radius - extent`.
pub fn hint_offset<R: Rng + ?Sized>(rng: &mut R, target: Point, extent: f64, radius: f64) -> Point {
    let max_offset = (radius - extent).max(0.0);
    let angle = rng.gen_range(0.0..TAU);
    let distance = if max_offset > 0.0 {
        rng.gen_range(0.0..=max_offset)
    } else {
        0.0
    };
    let desired = Point::new(
        target.x + distance * angle.cos(),
        target.y + distance * angle.sin(),
    );
    let centre = clamp_to_canvas(desired, radius);
    let offset = Point::new(centre.x - target.x, centre.y - target.y);
    let len = offset.x.hypot(offset.y);
    if len > max_offset && len > 0.0 {
        let k = max_offset / len;
        Point::new(offset.x * k, offset.y * k)
    } else {
        offset
    }
}

fn clamp_to_canvas(p: Point, radius: f64) -> Point {
    let clamp_axis = |v: f64| {
        if radius * 2.0 >= PUZZLE_SPACE {
            PUZZLE_SPACE / 2.0
        } else {
            v.clamp(radius, PUZZLE_SPACE - radius)
        }
    };
    Point::new(clamp_axis(p.x), clamp_axis(p.y))
}

/// Hint state machine for one play session.
///
/// The display timer lives with the caller: after
/// [`HINT_DURATION_MS`](crate::constants::HINT_DURATION_MS) it calls
/// [`HintEngine::expire`] with the generation of
/// the hint it was started for. Expiry hides the hint but keeps the
/// escalation state.
pub struct HintEngine<R> {
    rng: R,
    selection: HintSelection,
    state: Option<HintState>,
    last: Option<Hint>,
    showing: bool,
    generation: u64,
}

impl<R: Rng> HintEngine<R> {
    pub fn new(rng: R) -> Self {
        HintEngine {
            rng,
            selection: HintSelection::default(),
            state: None,
            last: None,
            showing: false,
            generation: 0,
        }
    }

    pub fn with_selection(mut self, selection: HintSelection) -> Self {
        self.selection = selection;
        self
    }

    /// Produce the next hint, or `None` when everything is already found.
    ///
    /// Asking again while the previous position is still unfound escalates its
    /// level; otherwise a new unfound position starts at level 0.
    pub fn request(&mut self, puzzle: &Puzzle, found: &BTreeSet<PositionKey>) -> Option<Hint> {
        let unfound: Vec<PositionRef<'_>> = puzzle
            .positions()
            .filter(|p| !found.contains(&p.key))
            .collect();
        if unfound.is_empty() {
            debug!(puzzle = %puzzle.id, "hint requested with nothing left to find");
            return None;
        }

        let repeat = self.state.as_ref().and_then(|s| {
            let key = s.key();
            unfound
                .iter()
                .position(|p| p.key == key)
                .map(|idx| (idx, (s.level + 1).min(HINT_MAX_LEVEL)))
        });
        let (idx, level) = match repeat {
            Some(hit) => hit,
            None => (self.pick(unfound.len()), 0),
        };
        let chosen = &unfound[idx];

        let target_center = chosen.position.center();
        let extent = chosen.position.extent_radius();
        // Large answers can outgrow the level radius; the circle grows to cover them.
        let radius = hint_radius(level).max(extent);
        let center_offset = hint_offset(&mut self.rng, target_center, extent, radius);

        self.generation += 1;
        self.showing = true;
        self.state = Some(HintState {
            target: chosen.target.title.clone(),
            position_index: chosen.index,
            level,
            center_offset,
        });
        let hint = Hint {
            key: chosen.key.clone(),
            level,
            radius,
            target_center,
            center_offset,
            generation: self.generation,
        };
        debug!(key = %hint.key, level, radius, "hint issued");
        self.last = Some(hint.clone());
        Some(hint)
    }

    fn pick(&mut self, candidates: usize) -> usize {
        match self.selection {
            HintSelection::FirstUnfound => 0,
            HintSelection::Random => self.rng.gen_range(0..candidates),
        }
    }

    /// Hide the hint started as `generation`. Stale generations are ignored.
    pub fn expire(&mut self, generation: u64) -> bool {
        if self.showing && generation == self.generation {
            self.showing = false;
            true
        } else {
            false
        }
    }

    /// A position was just found. Completion clears everything; finding the
    /// hinted position hides the circle so the next request starts over.
    pub fn on_found(&mut self, key: &PositionKey, completed: bool) {
        if completed {
            self.reset();
        } else if self.state.as_ref().is_some_and(|s| &s.key() == key) {
            self.showing = false;
        }
    }

    /// Forget everything (new puzzle, reset, completion).
    pub fn reset(&mut self) {
        self.state = None;
        self.last = None;
        self.showing = false;
        self.generation += 1;
    }

    pub fn is_showing(&self) -> bool {
        self.showing
    }

    pub fn state(&self) -> Option<&HintState> {
        self.state.as_ref()
    }

    /// The hint currently on screen, for re-projection after layout changes.
    pub fn visible_hint(&self) -> Option<&Hint> {
        self.last.as_ref().filter(|_| self.showing)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}
