use std::collections::{HashMap, HashSet};

use log::debug;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{
    GridCell, Point, Rect,
    config::SimConfig,
    map::{Grid, GridLayout},
};

/// Footprints, in cells, a generated obstacle may take.
const OBSTACLE_FOOTPRINTS: [(i32, i32); 7] =
    [(1, 1), (2, 2), (3, 2), (2, 3), (4, 4), (10, 1), (1, 10)];
const MAX_PLACEMENT_ATTEMPTS: usize = 1000;

/// Represents errors raised while building a world layout.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorldError {
    #[error("Map string is empty.")]
    EmptyMap,
    #[error("Map has zero width.")]
    ZeroWidth,
    #[error("Inconsistent width at row {row}: expected {expected}, found {found}")]
    InconsistentWidth {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("Map of {cols}x{rows} cells does not fit a field of {max_cols}x{max_rows} cells")]
    TooLarge {
        cols: usize,
        rows: usize,
        max_cols: i32,
        max_rows: i32,
    },
    #[error("Unknown map code '{code}' at position ({x}, {y}).")]
    UnknownCode { code: String, x: usize, y: usize },
    #[error("Multiple {0} markers found in map.")]
    Duplicate(&'static str),
    #[error("No {0} marker found in map.")]
    Missing(&'static str),
    #[error("Cell {0:?} is outside the playable field.")]
    OutOfBounds(GridCell),
    #[error("Cell {0:?} is already occupied.")]
    Occupied(GridCell),
    #[error("Could only place {placed} of {wanted} items.")]
    NoRoom { placed: usize, wanted: usize },
    #[error("No free cell left for the robot start.")]
    NoRobotStart,
}

/// Static content of a cell, as seen by a renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Tile {
    #[default]
    Floor,
    Obstacle,
    Station,
    Basket,
    Item,
}

/// Read and write access to the collectible items of a world.
///
/// The robot only ever mutates the world through this trait.
pub trait ItemStore {
    /// Uncollected items, in placement order.
    fn items(&self) -> &[Point];

    /// Removes the item at `item`. Returns `false` if there was none.
    fn take_item(&mut self, item: Point) -> bool;

    /// Puts an item back on the field.
    fn drop_item(&mut self, item: Point);
}

/// The field: charging station, basket, collectible items and fixed obstacles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct World {
    pub station: Rect,
    pub basket: Rect,
    items: Vec<Point>,
    obstacles: Vec<Rect>,
    robot_start: GridCell,
}

impl World {
    /// Creates a world without items or obstacles.
    pub fn new(station: Rect, basket: Rect, robot_start: GridCell) -> Self {
        World {
            station,
            basket,
            items: Vec::new(),
            obstacles: Vec::new(),
            robot_start,
        }
    }

    /// Station in the top-left corner of the playable area, basket in the
    /// bottom-right one, each one cell away from the edges.
    pub fn default_zones(config: &SimConfig) -> (Rect, Rect) {
        let cell = config.cell_size;
        let station = Rect::new(
            cell,
            cell + config.hud_height,
            config.station_size,
            config.station_size,
        );
        let basket = Rect::new(
            config.field_width - config.basket_size - cell,
            config.field_height - config.basket_size - cell,
            config.basket_size,
            config.basket_size,
        );
        (station, basket)
    }

    pub fn obstacles(&self) -> &[Rect] {
        &self.obstacles
    }

    /// Cell the robot starts an episode in.
    pub fn robot_start(&self) -> GridCell {
        self.robot_start
    }

    fn is_free(&self, layout: &GridLayout, rect: &Rect) -> bool {
        !rect.intersects(&self.station)
            && !rect.intersects(&self.basket)
            && !rect.intersects(&layout.cell_rect(self.robot_start))
            && !self.obstacles.iter().any(|o| rect.intersects(o))
            && !self
                .items
                .iter()
                .any(|item| rect.intersects(&layout.cell_rect(layout.cell_of(*item))))
    }

    /// Places an item at the center of `cell`.
    pub fn add_item(&mut self, layout: &GridLayout, cell: GridCell) -> Result<(), WorldError> {
        if !layout.contains(cell) {
            return Err(WorldError::OutOfBounds(cell));
        }
        if !self.is_free(layout, &layout.cell_rect(cell)) {
            return Err(WorldError::Occupied(cell));
        }
        self.items.push(layout.center_of(cell));
        Ok(())
    }

    /// Places a fixed obstacle. Every cell it covers must be free.
    pub fn add_obstacle(&mut self, layout: &GridLayout, rect: Rect) -> Result<(), WorldError> {
        let footprint = layout.cells_in_rect(&rect);
        if let Some(cell) = footprint.into_iter().find(|c| !layout.contains(*c)) {
            return Err(WorldError::OutOfBounds(cell));
        }
        if !self.is_free(layout, &rect) {
            return Err(WorldError::Occupied(layout.cell_of(Point::new(rect.x, rect.y))));
        }
        self.obstacles.push(rect);
        Ok(())
    }

    /// Cells a search must avoid: every item, the station and basket
    /// centers, and every cell covered by a fixed obstacle.
    pub fn obstacle_cells(&self, layout: &GridLayout) -> HashSet<GridCell> {
        self.fixtures().obstacle_cells(layout, &self.items)
    }

    /// Read-only view of everything but the items.
    pub fn fixtures(&self) -> Fixtures<'_> {
        Fixtures {
            station: self.station,
            basket: self.basket,
            obstacles: &self.obstacles,
        }
    }

    /// Splits the world into its fixed parts and the item store, so the
    /// robot can read the former while mutating the latter.
    pub fn split_mut(&mut self) -> (Fixtures<'_>, &mut dyn ItemStore) {
        let fixtures = Fixtures {
            station: self.station,
            basket: self.basket,
            obstacles: &self.obstacles,
        };
        (fixtures, &mut self.items)
    }

    /// Snapshot of the static content of every playable cell.
    pub fn tiles(&self, layout: &GridLayout) -> Grid<Tile> {
        let mut marks: HashMap<GridCell, Tile> = HashMap::new();
        for rect in &self.obstacles {
            for cell in layout.cells_in_rect(rect) {
                marks.insert(cell, Tile::Obstacle);
            }
        }
        for cell in layout.cells_in_rect(&self.station) {
            marks.insert(cell, Tile::Station);
        }
        for cell in layout.cells_in_rect(&self.basket) {
            marks.insert(cell, Tile::Basket);
        }
        for item in &self.items {
            marks.insert(layout.cell_of(*item), Tile::Item);
        }
        layout.grid_from(|cell| marks.get(&cell).copied().unwrap_or_default())
    }

    /// Generates a random layout: robot start, then fixed obstacles, then
    /// items, none of them overlapping.
    pub fn generate<R: Rng>(config: &SimConfig, rng: &mut R) -> Result<World, WorldError> {
        let layout = GridLayout::from_config(config);
        let (station, basket) = Self::default_zones(config);

        let random_cell = |rng: &mut R, cols: i32, rows: i32| {
            GridCell::new(
                rng.random_range(0..cols.max(1)),
                layout.first_row + rng.random_range(0..rows.max(1)),
            )
        };

        let robot_start = (0..MAX_PLACEMENT_ATTEMPTS)
            .map(|_| random_cell(rng, layout.cols, layout.rows()))
            .find(|cell| {
                let rect = layout.cell_rect(*cell);
                layout.contains(*cell) && !rect.intersects(&station) && !rect.intersects(&basket)
            })
            .ok_or(WorldError::NoRobotStart)?;
        let mut world = World::new(station, basket, robot_start);

        let mut attempts = 0;
        while world.obstacles.len() < config.obstacle_count && attempts < MAX_PLACEMENT_ATTEMPTS {
            attempts += 1;
            let (w, h) = OBSTACLE_FOOTPRINTS[rng.random_range(0..OBSTACLE_FOOTPRINTS.len())];
            let origin =
                random_cell(rng, layout.cols - w, layout.rows() - h).origin(layout.cell_size);
            let rect = Rect::new(origin.x, origin.y, w * layout.cell_size, h * layout.cell_size);
            // Collisions just mean another attempt.
            let _ = world.add_obstacle(&layout, rect);
        }

        attempts = 0;
        while world.items.len() < config.total_items {
            if attempts >= MAX_PLACEMENT_ATTEMPTS * 10 {
                return Err(WorldError::NoRoom {
                    placed: world.items.len(),
                    wanted: config.total_items,
                });
            }
            attempts += 1;
            let cell = random_cell(rng, layout.cols, layout.rows());
            let _ = world.add_item(&layout, cell);
        }

        debug!(
            "Generated world: robot at {:?}, {} obstacles, {} items",
            world.robot_start,
            world.obstacles.len(),
            world.items.len()
        );
        Ok(world)
    }
}

/// The parts of a world that never change during an episode.
#[derive(Debug, Clone, Copy)]
pub struct Fixtures<'a> {
    pub station: Rect,
    pub basket: Rect,
    pub obstacles: &'a [Rect],
}

impl Fixtures<'_> {
    /// Obstacle set for a search, given the items currently on the field.
    pub fn obstacle_cells(&self, layout: &GridLayout, items: &[Point]) -> HashSet<GridCell> {
        let mut cells: HashSet<GridCell> = items.iter().map(|p| layout.cell_of(*p)).collect();
        cells.insert(layout.cell_of(self.station.center()));
        cells.insert(layout.cell_of(self.basket.center()));
        for rect in self.obstacles {
            cells.extend(layout.cells_in_rect(rect));
        }
        cells
    }
}

impl ItemStore for Vec<Point> {
    fn items(&self) -> &[Point] {
        self
    }

    fn take_item(&mut self, item: Point) -> bool {
        match self.iter().position(|p| *p == item) {
            Some(index) => {
                self.remove(index);
                true
            }
            None => false,
        }
    }

    fn drop_item(&mut self, item: Point) {
        self.push(item);
    }
}

impl ItemStore for World {
    fn items(&self) -> &[Point] {
        &self.items
    }

    fn take_item(&mut self, item: Point) -> bool {
        self.items.take_item(item)
    }

    fn drop_item(&mut self, item: Point) {
        self.items.drop_item(item);
    }
}

/// Loads a world from a string representation of a map.
///
/// Tokens are separated by whitespace, one map row per line. The first line
/// is the first playable row under the HUD band.
///
/// | Token | Meaning        |
/// |-------|----------------|
/// | `..`  | floor          |
/// | `RB`  | robot start    |
/// | `ST`  | station        |
/// | `BK`  | basket         |
/// | `BL`  | item           |
/// | `WL`  | obstacle cell  |
pub fn load_world_from_string(map_string: &str, config: &SimConfig) -> Result<World, WorldError> {
    let layout = GridLayout::from_config(config);
    let lines: Vec<&str> = map_string.trim().lines().collect();
    if lines.is_empty() {
        return Err(WorldError::EmptyMap);
    }

    let height = lines.len();
    let mut width = 0;
    let mut parsed_rows: Vec<Vec<&str>> = Vec::with_capacity(height);

    for (y, line) in lines.iter().enumerate() {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if y == 0 {
            width = tokens.len();
            if width == 0 {
                return Err(WorldError::ZeroWidth);
            }
        } else if tokens.len() != width {
            return Err(WorldError::InconsistentWidth {
                row: y,
                expected: width,
                found: tokens.len(),
            });
        }
        parsed_rows.push(tokens);
    }

    if width as i32 > layout.cols || height as i32 > layout.rows() {
        return Err(WorldError::TooLarge {
            cols: width,
            rows: height,
            max_cols: layout.cols,
            max_rows: layout.rows(),
        });
    }

    let mut robot: Option<GridCell> = None;
    let mut station: Option<GridCell> = None;
    let mut basket: Option<GridCell> = None;
    let mut items = Vec::new();
    let mut walls = Vec::new();

    let mark_once = |slot: &mut Option<GridCell>, cell, name| match slot {
        Some(_) => Err(WorldError::Duplicate(name)),
        None => {
            *slot = Some(cell);
            Ok(())
        }
    };

    for (y, row_tokens) in parsed_rows.iter().enumerate() {
        for (x, token) in row_tokens.iter().enumerate() {
            let cell = GridCell::new(x as i32, layout.first_row + y as i32);
            match *token {
                ".." => {}
                "RB" => mark_once(&mut robot, cell, "robot ('RB')")?,
                "ST" => mark_once(&mut station, cell, "station ('ST')")?,
                "BK" => mark_once(&mut basket, cell, "basket ('BK')")?,
                "BL" => items.push(cell),
                "WL" => walls.push(cell),
                unknown => {
                    return Err(WorldError::UnknownCode {
                        code: unknown.to_string(),
                        x,
                        y,
                    });
                }
            }
        }
    }

    let robot = robot.ok_or(WorldError::Missing("robot ('RB')"))?;
    let station = station.ok_or(WorldError::Missing("station ('ST')"))?;
    let basket = basket.ok_or(WorldError::Missing("basket ('BK')"))?;

    let mut world = World::new(layout.cell_rect(station), layout.cell_rect(basket), robot);
    for cell in walls {
        world.add_obstacle(&layout, layout.cell_rect(cell))?;
    }
    for cell in items {
        world.add_item(&layout, cell)?;
    }
    Ok(world)
}
