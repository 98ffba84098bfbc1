/// Fixed-point scale of [`super::Multiplier`] (hundredths).
pub const MULTIPLIER_SCALE: u32 = 100;

/// Lowest multiplier a round can crash at (1.00x).
pub const MIN_CRASH_POINT_HUNDREDTHS: u32 = 100;

/// Highest multiplier a round can crash at (100.00x).
pub const MAX_CRASH_POINT_HUNDREDTHS: u32 = 10_000;

/// Number of past crash points kept for display.
pub const HISTORY_CAPACITY: usize = 50;

/// Mines board is a 5x5 grid.
pub const MINES_GRID_CELLS: u8 = 25;

/// Smallest mine count a board accepts.
pub const MINES_MIN_COUNT: u8 = 1;

/// Largest mine count a board accepts (one safe cell).
pub const MINES_MAX_COUNT: u8 = MINES_GRID_CELLS - 1;

/// House edge applied to the mines paytable, in basis points (3%).
pub const MINES_HOUSE_EDGE_BPS: u32 = 300;

/// Maximum display name length accepted from clients.
pub const MAX_DISPLAY_NAME_LENGTH: usize = 32;
