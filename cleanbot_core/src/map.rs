use std::ops::Index;

use serde::{Deserialize, Serialize};

use crate::{GridCell, Point, Rect, config::SimConfig};

/// Maps between world units and the playable cells of the field.
///
/// Columns span `[0, cols)`. Rows span `[first_row, end_row)`: the rows above
/// `first_row` are covered by the HUD band and never walkable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridLayout {
    pub cell_size: i32,
    pub cols: i32,
    pub first_row: i32,
    pub end_row: i32,
}

impl GridLayout {
    pub fn from_config(config: &SimConfig) -> Self {
        GridLayout {
            cell_size: config.cell_size,
            cols: config.field_width / config.cell_size,
            first_row: config.hud_height / config.cell_size,
            end_row: config.field_height / config.cell_size,
        }
    }

    /// Number of playable rows.
    #[inline]
    pub fn rows(&self) -> i32 {
        self.end_row - self.first_row
    }

    #[inline]
    pub fn cell_of(&self, point: Point) -> GridCell {
        point.cell(self.cell_size)
    }

    #[inline]
    pub fn center_of(&self, cell: GridCell) -> Point {
        cell.center(self.cell_size)
    }

    /// The footprint of a cell as a rectangle.
    pub fn cell_rect(&self, cell: GridCell) -> Rect {
        let origin = cell.origin(self.cell_size);
        Rect::new(origin.x, origin.y, self.cell_size, self.cell_size)
    }

    /// Checks if the cell lies inside the playable area.
    #[inline]
    pub fn contains(&self, cell: GridCell) -> bool {
        cell.col >= 0
            && cell.col < self.cols
            && cell.row >= self.first_row
            && cell.row < self.end_row
    }

    /// Returns every cell whose origin lies inside the rectangle's footprint.
    pub fn cells_in_rect(&self, rect: &Rect) -> Vec<GridCell> {
        let first = self.cell_of(Point::new(rect.left(), rect.top()));
        let cols = (rect.width + self.cell_size - 1) / self.cell_size;
        let rows = (rect.height + self.cell_size - 1) / self.cell_size;
        let mut cells = Vec::with_capacity((cols * rows).max(0) as usize);
        for dr in 0..rows {
            for dc in 0..cols {
                cells.push(first.offset(dc, dr));
            }
        }
        cells
    }

    /// Creates a grid covering the playable area, filled by `f` for each cell.
    pub fn grid_from<T, F>(&self, mut f: F) -> Grid<T>
    where
        F: FnMut(GridCell) -> T,
    {
        let first_row = self.first_row as usize;
        Grid::from_generator(self.cols as usize, self.rows() as usize, |x, y| {
            f(GridCell::new(x as i32, (y + first_row) as i32))
        })
    }
}

/// Row-major snapshot of one value per playable cell.
///
/// Built by [`GridLayout::grid_from`]; `(x, y)` indexes count from the
/// top-left playable cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grid<T> {
    width: usize,
    height: usize,
    cells: Vec<T>,
}

impl<T> Grid<T> {
    fn from_generator<F>(width: usize, height: usize, mut f: F) -> Self
    where
        F: FnMut(usize, usize) -> T,
    {
        let cells = (0..height)
            .flat_map(|y| (0..width).map(move |x| (x, y)))
            .map(|(x, y)| f(x, y))
            .collect();
        Grid {
            width,
            height,
            cells,
        }
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Rows from top to bottom, each a slice in column order.
    pub fn rows(&self) -> impl Iterator<Item = &[T]> {
        self.cells.chunks(self.width.max(1))
    }
}

impl<T> Index<(usize, usize)> for Grid<T> {
    type Output = T;

    fn index(&self, (x, y): (usize, usize)) -> &T {
        assert!(
            x < self.width && y < self.height,
            "cell ({x}, {y}) outside a {}x{} snapshot",
            self.width,
            self.height
        );
        &self.cells[y * self.width + x]
    }
}
