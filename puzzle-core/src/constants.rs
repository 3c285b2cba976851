/// Shared numeric constants.
/// Distances are expressed in puzzle-space units (0..=1000 per axis) unless noted otherwise.
pub const PUZZLE_SPACE: f64 = 1000.0;

/// Hit radius of a small circle position.
pub const HIT_RADIUS_SMALL: f64 = 16.0;
/// Hit radius of a medium circle position (also used for legacy `[x, y]` tuples).
pub const HIT_RADIUS_MEDIUM: f64 = 32.0;
/// Hit radius of a large circle position.
pub const HIT_RADIUS_LARGE: f64 = 64.0;

/// Minimum number of vertices an authored polygon must have.
pub const MIN_POLYGON_POINTS: usize = 3;

/// Hint circle radius at level 0.
pub const HINT_INITIAL_RADIUS: f64 = 250.0;
/// Hint circle radius never shrinks below this.
pub const HINT_MIN_RADIUS: f64 = 62.0;
/// Highest hint level (levels are 0, 1 and 2).
pub const HINT_MAX_LEVEL: u32 = 2;
/// How long a hint stays on screen (ms).
pub const HINT_DURATION_MS: u32 = 3000;

/// Zoom limits for the play view.
pub const MIN_ZOOM: f64 = 1.0;
pub const MAX_ZOOM: f64 = 5.0;

/// Half the edge of a square thumbnail crop, in puzzle-space units.
pub const THUMBNAIL_HALF_EXTENT: f64 = 60.0;
