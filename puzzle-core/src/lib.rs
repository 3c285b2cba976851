//! Core of the hidden-object game: hit testing, hints, find tracking and
//! viewport mapping, plus the storage, catalog and authoring pieces around
//! them. Nothing here touches the browser.

pub mod catalog;
pub mod constants;
pub mod editor;
pub mod error;
pub mod geometry;
pub mod hint;
pub mod locale;
pub mod mapping;
pub mod models;
pub mod progress;
pub mod remote;
pub mod store;
pub mod thumbnail;

pub use error::{PuzzleError, RemoteError, StorageError};
pub use hint::{Hint, HintEngine, HintSelection};
pub use mapping::{Rect, Viewport};
pub use models::{CircleSize, CustomPuzzle, Point, Position, PositionKey, Progress, Puzzle, Target};
pub use progress::{FindMachine, FindPhase, MarkOutcome};

/// Marker colour for the `i`-th target in the found list.
pub fn marker_color(i: usize) -> &'static str {
    // Fixed categorical palette, cycled by index.
    const PALETTE: [&str; 12] = [
        "crimson",
        "darkorange",
        "gold",
        "yellowgreen",
        "seagreen",
        "teal",
        "deepskyblue",
        "royalblue",
        "blueviolet",
        "orchid",
        "hotpink",
        "sienna",
    ];
    PALETTE[i % PALETTE.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_colors_cycle() {
        assert_eq!(marker_color(0), "crimson");
        assert_eq!(marker_color(12), marker_color(0));
        assert_ne!(marker_color(1), marker_color(2));
    }
}
