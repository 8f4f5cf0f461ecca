//! Property-based tests for the A* search.
//!
//! Random obstacle fields on a small grid, checked against breadth-first
//! search and against the incremental pathfinder.

use std::collections::{HashMap, HashSet, VecDeque};

use cleanbot_core::{
    GridCell, Point,
    config::SimConfig,
    map::GridLayout,
    pathfinder::{Pathfinder, SearchStep, find_path},
};
use proptest::prelude::*;

const SIDE: i32 = 8;
const CELL: i32 = 30;

fn layout() -> GridLayout {
    GridLayout::from_config(&SimConfig {
        cell_size: CELL,
        field_width: SIDE * CELL,
        field_height: SIDE * CELL,
        hud_height: 0,
        ..SimConfig::default()
    })
}

fn arb_cell() -> impl Strategy<Value = GridCell> {
    (0..SIDE, 0..SIDE).prop_map(|(col, row)| GridCell::new(col, row))
}

/// Obstacle fields where roughly a third of the cells are blocked.
fn arb_obstacles() -> impl Strategy<Value = HashSet<GridCell>> {
    prop::collection::vec(prop::bool::weighted(0.3), (SIDE * SIDE) as usize).prop_map(|mask| {
        mask.into_iter()
            .enumerate()
            .filter(|(_, blocked)| *blocked)
            .map(|(i, _)| GridCell::new(i as i32 % SIDE, i as i32 / SIDE))
            .collect()
    })
}

/// Shortest step count from `start` to `goal`, treating the goal as walkable.
fn bfs_distance(
    layout: &GridLayout,
    start: GridCell,
    goal: GridCell,
    obstacles: &HashSet<GridCell>,
) -> Option<usize> {
    let mut dist = HashMap::from([(start, 0usize)]);
    let mut queue = VecDeque::from([start]);
    while let Some(cell) = queue.pop_front() {
        if cell == goal {
            return dist.get(&cell).copied();
        }
        let d = dist[&cell];
        for (dc, dr) in [(0, 1), (0, -1), (1, 0), (-1, 0)] {
            let next = cell.offset(dc, dr);
            let walkable = layout.contains(next) && (next == goal || !obstacles.contains(&next));
            if walkable && !dist.contains_key(&next) {
                dist.insert(next, d + 1);
                queue.push_back(next);
            }
        }
    }
    None
}

fn run_incremental(
    layout: &GridLayout,
    start: Point,
    goal: Point,
    obstacles: &HashSet<GridCell>,
) -> Option<Vec<Point>> {
    let mut pathfinder = Pathfinder::new(*layout);
    pathfinder.start_search(start, goal, obstacles.clone());
    for _ in 0..=(SIDE * SIDE * 4) {
        match pathfinder.step() {
            SearchStep::InProgress => {}
            SearchStep::Found(path) => return Some(path),
            SearchStep::NoPath => return None,
        }
    }
    panic!("incremental search did not terminate");
}

proptest! {
    #[test]
    fn path_length_matches_breadth_first_search(
        start in arb_cell(),
        goal in arb_cell(),
        obstacles in arb_obstacles(),
    ) {
        let layout = layout();
        let path = find_path(&layout, start.center(CELL), goal.center(CELL), &obstacles);
        let expected = bfs_distance(&layout, start, goal, &obstacles);
        prop_assert_eq!(path.map(|p| p.len()), expected);
    }

    #[test]
    fn path_is_a_walkable_chain_of_cardinal_steps(
        start in arb_cell(),
        goal in arb_cell(),
        obstacles in arb_obstacles(),
    ) {
        let layout = layout();
        let Some(path) = find_path(&layout, start.center(CELL), goal.center(CELL), &obstacles)
        else {
            return Ok(());
        };

        let mut previous = start;
        for waypoint in &path {
            prop_assert_eq!(*waypoint, layout.center_of(layout.cell_of(*waypoint)));
            let cell = layout.cell_of(*waypoint);
            prop_assert!(layout.contains(cell));
            prop_assert_eq!(previous.manhattan(&cell), 1);
            prop_assert!(cell == goal || !obstacles.contains(&cell));
            previous = cell;
        }
        prop_assert_eq!(previous, goal);
    }

    #[test]
    fn incremental_search_matches_atomic_search(
        start in arb_cell(),
        goal in arb_cell(),
        obstacles in arb_obstacles(),
    ) {
        let layout = layout();
        let (from, to) = (start.center(CELL), goal.center(CELL));
        prop_assert_eq!(
            run_incremental(&layout, from, to, &obstacles),
            find_path(&layout, from, to, &obstacles)
        );
    }
}
