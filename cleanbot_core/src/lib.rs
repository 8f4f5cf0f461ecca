use serde::{Deserialize, Serialize};

pub mod config;
pub mod map;
pub mod motion;
pub mod pathfinder;
pub mod robot;
pub mod simulation;
pub mod world;

/// A position in world units (the pixel space the field is drawn in).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Point { x, y }
    }

    /// Returns the grid cell containing this point (floor division).
    #[inline]
    pub fn cell(&self, cell_size: i32) -> GridCell {
        GridCell {
            col: self.x.div_euclid(cell_size),
            row: self.y.div_euclid(cell_size),
        }
    }

    /// Returns manhattan distance between two points.
    pub fn manhattan(&self, other: &Point) -> i32 {
        (self.x - other.x).abs() + (self.y - other.y).abs()
    }
}

/// A discrete cell of the navigation grid.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct GridCell {
    pub col: i32,
    pub row: i32,
}

impl GridCell {
    pub const fn new(col: i32, row: i32) -> Self {
        GridCell { col, row }
    }

    /// The waypoint for this cell: its center in world units.
    #[inline]
    pub fn center(&self, cell_size: i32) -> Point {
        Point {
            x: self.col * cell_size + cell_size / 2,
            y: self.row * cell_size + cell_size / 2,
        }
    }

    /// The top-left corner of this cell in world units.
    #[inline]
    pub fn origin(&self, cell_size: i32) -> Point {
        Point {
            x: self.col * cell_size,
            y: self.row * cell_size,
        }
    }

    /// Returns manhattan distance between two cells.
    #[inline]
    pub fn manhattan(&self, other: &GridCell) -> u32 {
        self.col.abs_diff(other.col) + self.row.abs_diff(other.row)
    }

    /// Returns the cell offset by `(dc, dr)`.
    #[inline]
    pub fn offset(&self, dc: i32, dr: i32) -> GridCell {
        GridCell {
            col: self.col + dc,
            row: self.row + dr,
        }
    }
}

/// An axis-aligned rectangle in world units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Rect {
            x,
            y,
            width,
            height,
        }
    }

    #[inline]
    pub fn left(&self) -> i32 {
        self.x
    }

    #[inline]
    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    #[inline]
    pub fn top(&self) -> i32 {
        self.y
    }

    #[inline]
    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    pub fn center(&self) -> Point {
        Point {
            x: self.x + self.width / 2,
            y: self.y + self.height / 2,
        }
    }

    /// Point containment. The right and bottom edges are exclusive.
    pub fn contains_point(&self, point: Point) -> bool {
        point.x >= self.left()
            && point.x < self.right()
            && point.y >= self.top()
            && point.y < self.bottom()
    }

    /// Returns true if `other` lies entirely inside this rectangle.
    pub fn contains_rect(&self, other: &Rect) -> bool {
        other.left() >= self.left()
            && other.right() <= self.right()
            && other.top() >= self.top()
            && other.bottom() <= self.bottom()
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.left() < other.right()
            && other.left() < self.right()
            && self.top() < other.bottom()
            && other.top() < self.bottom()
    }
}

/// Terminal result of an episode. These are expected end states, not faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EpisodeOutcome {
    /// Every item has been delivered to the basket.
    Success,
    /// No route could be found within the retry budget.
    Stuck,
    /// The battery ran out.
    Dead,
}

impl EpisodeOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            EpisodeOutcome::Success => "mission complete",
            EpisodeOutcome::Stuck => "no route possible",
            EpisodeOutcome::Dead => "battery depleted",
        }
    }
}
