//! A* search over the 4-connected field grid.
//!
//! [`find_path`] runs a search to completion in one call. [`Pathfinder`] runs
//! the same search one expansion per [`Pathfinder::step`] and keeps its
//! scores around so they can be displayed. Both drive the same frontier
//! expansion, so for identical inputs they return identical paths.

use std::{
    cmp::Ordering,
    collections::{BinaryHeap, HashMap, HashSet},
};

use log::{debug, trace};

use crate::{GridCell, Point, map::GridLayout};

/// Offsets expanded around a cell, in this order.
const NEIGHBOR_OFFSETS: [(i32, i32); 4] = [(0, 1), (0, -1), (1, 0), (-1, 0)];

/// Manhattan distance between two cells.
#[inline]
pub fn heuristic(a: GridCell, b: GridCell) -> u32 {
    a.manhattan(&b)
}

/// Result of a single [`Pathfinder::step`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchStep {
    /// Waypoints from the cell after the start up to the goal.
    Found(Vec<Point>),
    /// The open set ran dry before the goal was reached.
    NoPath,
    /// One node was expanded; call `step` again.
    InProgress,
}

/// Open set entry. Ordered so that `BinaryHeap` pops the lowest f-score
/// first, and among equal f-scores the entry pushed first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OpenEntry {
    f_score: u32,
    seq: u64,
    g_score: u32,
    cell: GridCell,
}

impl Ord for OpenEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .f_score
            .cmp(&self.f_score)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Mutable state of one A* search.
///
/// Obstacles are not owned here so the atomic search can borrow the caller's
/// set while the incremental one keeps its own copy.
#[derive(Debug, Clone)]
struct Frontier {
    start: GridCell,
    goal: GridCell,
    open: BinaryHeap<OpenEntry>,
    closed: HashSet<GridCell>,
    g_score: HashMap<GridCell, u32>,
    came_from: HashMap<GridCell, GridCell>,
    next_seq: u64,
}

impl Frontier {
    fn new(start: GridCell, goal: GridCell) -> Self {
        let mut frontier = Frontier {
            start,
            goal,
            open: BinaryHeap::new(),
            closed: HashSet::new(),
            g_score: HashMap::new(),
            came_from: HashMap::new(),
            next_seq: 0,
        };
        frontier.g_score.insert(start, 0);
        frontier.push(start, 0);
        frontier
    }

    fn push(&mut self, cell: GridCell, g_score: u32) {
        self.open.push(OpenEntry {
            f_score: g_score + heuristic(cell, self.goal),
            seq: self.next_seq,
            g_score,
            cell,
        });
        self.next_seq += 1;
    }

    /// A neighbor can be entered if it is on the field and either free or
    /// the goal itself.
    fn is_walkable(
        &self,
        cell: GridCell,
        layout: &GridLayout,
        obstacles: &HashSet<GridCell>,
    ) -> bool {
        layout.contains(cell) && (cell == self.goal || !obstacles.contains(&cell))
    }

    /// Pops the best open node and expands it.
    ///
    /// Entries for cells that were closed, or superseded by a cheaper entry
    /// pushed later, are discarded without counting as an expansion.
    fn expand(&mut self, layout: &GridLayout, obstacles: &HashSet<GridCell>) -> Expansion {
        let current = loop {
            let Some(entry) = self.open.pop() else {
                return Expansion::Exhausted;
            };
            if self.closed.contains(&entry.cell) {
                continue;
            }
            if self.g_score.get(&entry.cell).is_some_and(|&g| entry.g_score > g) {
                continue;
            }
            break entry;
        };

        if current.cell == self.goal {
            return Expansion::Reached(self.reconstruct());
        }
        self.closed.insert(current.cell);

        for (dc, dr) in NEIGHBOR_OFFSETS {
            let neighbor = current.cell.offset(dc, dr);
            if self.closed.contains(&neighbor) || !self.is_walkable(neighbor, layout, obstacles) {
                continue;
            }
            let tentative = current.g_score + 1;
            if tentative < self.g_score.get(&neighbor).copied().unwrap_or(u32::MAX) {
                self.g_score.insert(neighbor, tentative);
                self.came_from.insert(neighbor, current.cell);
                self.push(neighbor, tentative);
            }
        }
        Expansion::Expanded(current.cell)
    }

    /// Cells from the one after `start` up to `goal`, in walking order.
    fn reconstruct(&self) -> Vec<GridCell> {
        let mut cells = Vec::new();
        let mut current = self.goal;
        while current != self.start {
            cells.push(current);
            match self.came_from.get(&current) {
                Some(previous) => current = *previous,
                None => break,
            }
        }
        cells.reverse();
        cells
    }
}

enum Expansion {
    Expanded(GridCell),
    Reached(Vec<GridCell>),
    Exhausted,
}

fn to_waypoints(cells: &[GridCell], layout: &GridLayout) -> Vec<Point> {
    cells.iter().map(|cell| layout.center_of(*cell)).collect()
}

/// Runs A* from `start` to `goal` in one call.
///
/// Returns the waypoints (cell centers) after the start cell, ending at the
/// goal's cell center; an empty path if both lie in the same cell, and `None`
/// if the goal cannot be reached. The goal cell is walkable even when it is
/// listed in `obstacles`.
pub fn find_path(
    layout: &GridLayout,
    start: Point,
    goal: Point,
    obstacles: &HashSet<GridCell>,
) -> Option<Vec<Point>> {
    let mut frontier = Frontier::new(layout.cell_of(start), layout.cell_of(goal));
    loop {
        match frontier.expand(layout, obstacles) {
            Expansion::Expanded(_) => {}
            Expansion::Reached(cells) => return Some(to_waypoints(&cells, layout)),
            Expansion::Exhausted => return None,
        }
    }
}

/// Where an incremental search stands.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Phase {
    Idle,
    Searching,
    Found(Vec<GridCell>),
    NoPath,
}

/// A* search that advances one expansion per [`step`](Pathfinder::step).
///
/// The g-scores, closed set and final path stay readable until
/// [`clear`](Pathfinder::clear) so a front end can draw the search.
#[derive(Debug, Clone)]
pub struct Pathfinder {
    layout: GridLayout,
    obstacles: HashSet<GridCell>,
    frontier: Option<Frontier>,
    phase: Phase,
    final_path: HashSet<GridCell>,
    expansions: usize,
}

impl Pathfinder {
    pub fn new(layout: GridLayout) -> Self {
        Pathfinder {
            layout,
            obstacles: HashSet::new(),
            frontier: None,
            phase: Phase::Idle,
            final_path: HashSet::new(),
            expansions: 0,
        }
    }

    /// Discards any previous search and seeds a new one at `start`.
    pub fn start_search(&mut self, start: Point, goal: Point, obstacles: HashSet<GridCell>) {
        self.clear();
        let (start, goal) = (self.layout.cell_of(start), self.layout.cell_of(goal));
        debug!("Starting incremental search from {:?} to {:?}", start, goal);
        self.obstacles = obstacles;
        self.frontier = Some(Frontier::new(start, goal));
        self.phase = Phase::Searching;
    }

    /// Expands one node.
    ///
    /// Once the search has finished, further calls repeat its result. Without
    /// a started search this reports `NoPath`.
    pub fn step(&mut self) -> SearchStep {
        match &self.phase {
            Phase::Searching => {}
            Phase::Found(cells) => return SearchStep::Found(to_waypoints(cells, &self.layout)),
            Phase::NoPath | Phase::Idle => return SearchStep::NoPath,
        }
        let Some(frontier) = self.frontier.as_mut() else {
            self.phase = Phase::NoPath;
            return SearchStep::NoPath;
        };

        match frontier.expand(&self.layout, &self.obstacles) {
            Expansion::Expanded(cell) => {
                self.expansions += 1;
                trace!("Expanded {:?} (expansion {})", cell, self.expansions);
                SearchStep::InProgress
            }
            Expansion::Reached(cells) => {
                debug!(
                    "Incremental search reached goal after {} expansions, path length {}",
                    self.expansions,
                    cells.len()
                );
                self.final_path = cells.iter().copied().collect();
                let waypoints = to_waypoints(&cells, &self.layout);
                self.phase = Phase::Found(cells);
                SearchStep::Found(waypoints)
            }
            Expansion::Exhausted => {
                debug!("Incremental search exhausted after {} expansions", self.expansions);
                self.phase = Phase::NoPath;
                SearchStep::NoPath
            }
        }
    }

    /// Resets all search state. Safe to call at any time.
    pub fn clear(&mut self) {
        self.obstacles.clear();
        self.frontier = None;
        self.phase = Phase::Idle;
        self.final_path.clear();
        self.expansions = 0;
    }

    /// True while a search has been started and has not finished yet.
    pub fn is_searching(&self) -> bool {
        self.phase == Phase::Searching
    }

    pub fn layout(&self) -> &GridLayout {
        &self.layout
    }

    pub fn goal(&self) -> Option<GridCell> {
        self.frontier.as_ref().map(|f| f.goal)
    }

    /// Best known cost from the start for every reached cell.
    pub fn g_scores(&self) -> Option<&HashMap<GridCell, u32>> {
        self.frontier.as_ref().map(|f| &f.g_score)
    }

    pub fn closed(&self) -> Option<&HashSet<GridCell>> {
        self.frontier.as_ref().map(|f| &f.closed)
    }

    /// Heuristic estimate from `cell` to the current goal.
    pub fn heuristic_to_goal(&self, cell: GridCell) -> Option<u32> {
        self.goal().map(|goal| heuristic(cell, goal))
    }

    /// f = g + h for a cell the search has reached.
    pub fn f_score(&self, cell: GridCell) -> Option<u32> {
        let g = self.g_scores()?.get(&cell)?;
        Some(g + self.heuristic_to_goal(cell)?)
    }

    /// Cells of the path found by the last search, in walking order; empty
    /// until `Found`.
    pub fn final_path(&self) -> &[GridCell] {
        match &self.phase {
            Phase::Found(cells) => cells.as_slice(),
            Phase::Idle | Phase::Searching | Phase::NoPath => &[],
        }
    }

    pub fn is_on_final_path(&self, cell: GridCell) -> bool {
        self.final_path.contains(&cell)
    }

    pub fn expansions(&self) -> usize {
        self.expansions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;

    fn layout() -> GridLayout {
        GridLayout::from_config(&SimConfig::default())
    }

    /// Center of a cell counted from the first playable row.
    fn at(col: i32, row: i32) -> Point {
        GridCell::new(col, row + 2).center(30)
    }

    fn cell(col: i32, row: i32) -> GridCell {
        GridCell::new(col, row + 2)
    }

    fn run_to_end(pathfinder: &mut Pathfinder) -> (SearchStep, usize) {
        let mut calls = 0;
        loop {
            calls += 1;
            match pathfinder.step() {
                SearchStep::InProgress => continue,
                done => return (done, calls),
            }
        }
    }

    #[test]
    fn straight_line_without_obstacles() {
        let path = find_path(&layout(), at(0, 0), at(5, 0), &HashSet::new()).unwrap();
        assert_eq!(path.len(), 5);
        assert_eq!(path.last(), Some(&at(5, 0)));
        assert_eq!(path.first(), Some(&at(1, 0)));
    }

    #[test]
    fn same_cell_gives_empty_path() {
        let start = at(3, 3);
        let goal = Point::new(start.x + 4, start.y - 2);
        let path = find_path(&layout(), start, goal, &HashSet::new());
        assert_eq!(path, Some(vec![]));
    }

    #[test]
    fn detours_around_a_wall() {
        let wall: HashSet<GridCell> = (0..5).map(|row| cell(2, row)).collect();
        let path = find_path(&layout(), at(0, 0), at(5, 0), &wall).unwrap();
        // Down past the wall end at row 5, over, and back up.
        assert_eq!(path.len(), 15);
        assert_eq!(path.last(), Some(&at(5, 0)));
        for waypoint in &path {
            assert!(!wall.contains(&waypoint.cell(30)));
        }
    }

    #[test]
    fn goal_cell_is_walkable_even_if_blocked() {
        let obstacles: HashSet<GridCell> = [cell(4, 0), cell(3, 0)].into_iter().collect();
        let path = find_path(&layout(), at(0, 0), at(4, 0), &obstacles).unwrap();
        assert_eq!(path.last(), Some(&at(4, 0)));
        assert!(!path.contains(&at(3, 0)));
        assert_eq!(path.len(), 6);
    }

    #[test]
    fn enclosed_goal_has_no_path() {
        let obstacles: HashSet<GridCell> =
            [cell(4, 0), cell(6, 0), cell(5, 1)].into_iter().collect();
        // The row above (5, 0) is the HUD band, so the goal is sealed off.
        assert_eq!(find_path(&layout(), at(0, 0), at(5, 0), &obstacles), None);
    }

    #[test]
    fn never_walks_into_the_hud_band() {
        let path = find_path(&layout(), at(0, 0), at(26, 0), &HashSet::new()).unwrap();
        assert!(path.iter().all(|p| p.cell(30).row >= 2));
        let wall: HashSet<GridCell> = (1..20).map(|row| cell(10, row)).collect();
        // Only gap in the wall is row 0, right under the HUD.
        let path = find_path(&layout(), at(0, 5), at(20, 5), &wall).unwrap();
        assert!(path.contains(&at(10, 0)));
    }

    #[test]
    fn incremental_matches_atomic() {
        let obstacles: HashSet<GridCell> =
            [cell(2, 0), cell(2, 1), cell(2, 2), cell(4, 3), cell(5, 3)]
                .into_iter()
                .collect();
        let expected = find_path(&layout(), at(0, 1), at(7, 2), &obstacles).unwrap();

        let mut pathfinder = Pathfinder::new(layout());
        pathfinder.start_search(at(0, 1), at(7, 2), obstacles);
        let (result, calls) = run_to_end(&mut pathfinder);
        assert_eq!(result, SearchStep::Found(expected.clone()));
        assert!(calls > 1);
        let walked: Vec<Point> =
            pathfinder.final_path().iter().map(|c| c.center(30)).collect();
        assert_eq!(walked, expected);
        assert_eq!(pathfinder.final_path().last(), Some(&cell(7, 2)));
        assert!(pathfinder.is_on_final_path(cell(7, 2)));
        assert!(!pathfinder.is_on_final_path(cell(0, 1)));
        // Finished searches repeat their result.
        assert_eq!(pathfinder.step(), SearchStep::Found(expected));
        assert!(!pathfinder.is_searching());
    }

    #[test]
    fn incremental_reports_no_path() {
        let obstacles: HashSet<GridCell> =
            [cell(4, 0), cell(6, 0), cell(5, 1)].into_iter().collect();
        let mut pathfinder = Pathfinder::new(layout());
        pathfinder.start_search(at(0, 0), at(5, 0), obstacles);
        let (result, calls) = run_to_end(&mut pathfinder);
        assert_eq!(result, SearchStep::NoPath);
        // Every playable cell except the goal and its three walls gets closed once.
        assert_eq!(calls, 27 * 20 - 4 + 1);
        assert!(pathfinder.final_path().is_empty());
    }

    #[test]
    fn step_exposes_scores() {
        let mut pathfinder = Pathfinder::new(layout());
        pathfinder.start_search(at(0, 0), at(3, 0), HashSet::new());
        assert_eq!(pathfinder.goal(), Some(cell(3, 0)));
        assert_eq!(pathfinder.g_scores().unwrap().get(&cell(0, 0)), Some(&0));
        assert_eq!(pathfinder.step(), SearchStep::InProgress);
        assert_eq!(pathfinder.expansions(), 1);
        assert_eq!(pathfinder.g_scores().unwrap().get(&cell(1, 0)), Some(&1));
        assert_eq!(pathfinder.g_scores().unwrap().get(&cell(0, 1)), Some(&1));
        assert!(pathfinder.closed().unwrap().contains(&cell(0, 0)));
        assert_eq!(pathfinder.heuristic_to_goal(cell(0, 0)), Some(3));
        assert_eq!(pathfinder.f_score(cell(1, 0)), Some(1 + 2));
        assert_eq!(pathfinder.f_score(cell(0, 1)), Some(1 + 4));
        assert_eq!(pathfinder.f_score(cell(5, 5)), None);
    }

    #[test]
    fn clear_abandons_a_search_midway() {
        let mut pathfinder = Pathfinder::new(layout());
        pathfinder.start_search(at(0, 0), at(10, 10), HashSet::new());
        pathfinder.step();
        pathfinder.step();
        assert!(pathfinder.is_searching());
        pathfinder.clear();
        assert!(!pathfinder.is_searching());
        assert_eq!(pathfinder.goal(), None);
        assert!(pathfinder.g_scores().is_none());
        assert_eq!(pathfinder.expansions(), 0);
        assert_eq!(pathfinder.step(), SearchStep::NoPath);
    }

    #[test]
    fn start_equals_goal_found_on_first_step() {
        let mut pathfinder = Pathfinder::new(layout());
        pathfinder.start_search(at(2, 2), at(2, 2), HashSet::new());
        assert_eq!(pathfinder.step(), SearchStep::Found(vec![]));
    }
}
