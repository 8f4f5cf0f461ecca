use std::collections::{HashSet, VecDeque};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::{
    EpisodeOutcome, GridCell, Point, Rect,
    config::SimConfig,
    map::GridLayout,
    motion::{self, Motion},
    pathfinder::{Pathfinder, SearchStep, find_path},
    world::{Fixtures, ItemStore},
};

/// Operational state of the robot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RobotState {
    /// Looking for the nearest reachable item.
    #[default]
    Seeking,
    /// Carrying an item to the basket.
    Collecting,
    /// Heading for the charging station.
    Charging,
    /// Docked at the station, filling the battery.
    Recharging,
    /// Battery exhausted. Terminal.
    Dead,
    /// Ran out of path retries. Terminal.
    Stuck,
}

impl RobotState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RobotState::Dead | RobotState::Stuck)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RobotState::Seeking => "SEEKING",
            RobotState::Collecting => "COLLECTING",
            RobotState::Charging => "CHARGING",
            RobotState::Recharging => "RECHARGING",
            RobotState::Dead => "DEAD",
            RobotState::Stuck => "STUCK",
        }
    }
}

/// How decision ticks plan and execute routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Mode {
    /// Routes are planned in one call and walked with interpolated motion.
    #[default]
    Normal,
    /// Routes are planned one expansion per tick and walked cell by cell.
    Inspection,
}

/// What a decision tick ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickAction {
    /// Nothing to do this tick.
    Idle,
    /// A terminal outcome was reached, now or earlier.
    Finished(EpisodeOutcome),
    /// The state changed without moving.
    Transitioned(RobotState),
    /// Charge was added at the station.
    Recharged,
    /// One waypoint was committed.
    Moved(Point),
    /// A route was planned, or the incremental search advanced.
    Planned,
    /// No route could be found; the retry counter went up.
    Blocked,
}

/// The cleaning robot: battery, task state and the route it is following.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Robot {
    rect: Rect,
    charge: f64,
    state: RobotState,
    carrying: bool,
    target_item: Option<Point>,
    collected: usize,
    total_items: usize,
    path: VecDeque<Point>,
    stuck_count: u32,
    motion: Motion,
    trail: Vec<Point>,
    outcome: Option<EpisodeOutcome>,
}

impl Robot {
    /// Places a fully charged robot on `start`. The episode succeeds once
    /// `total_items` items have been delivered.
    pub fn new(start: GridCell, config: &SimConfig, total_items: usize) -> Self {
        let origin = start.origin(config.cell_size);
        let rect = Rect::new(origin.x, origin.y, config.cell_size, config.cell_size);
        Robot {
            rect,
            charge: config.max_charge,
            state: RobotState::Seeking,
            carrying: false,
            target_item: None,
            collected: 0,
            total_items,
            path: VecDeque::new(),
            stuck_count: 0,
            motion: Motion::at_rest(origin),
            trail: vec![rect.center()],
            outcome: None,
        }
    }

    pub fn rect(&self) -> &Rect {
        &self.rect
    }

    pub fn position(&self) -> Point {
        self.rect.center()
    }

    pub fn charge(&self) -> f64 {
        self.charge
    }

    pub fn state(&self) -> RobotState {
        self.state
    }

    pub fn is_carrying(&self) -> bool {
        self.carrying
    }

    pub fn target_item(&self) -> Option<Point> {
        self.target_item
    }

    pub fn collected(&self) -> usize {
        self.collected
    }

    pub fn total_items(&self) -> usize {
        self.total_items
    }

    /// Waypoints still to walk, nearest first.
    pub fn path(&self) -> &VecDeque<Point> {
        &self.path
    }

    pub fn stuck_count(&self) -> u32 {
        self.stuck_count
    }

    pub fn motion(&self) -> &Motion {
        &self.motion
    }

    pub fn is_moving(&self) -> bool {
        self.motion.is_moving()
    }

    /// Every waypoint the robot has stood on, starting with its start cell.
    pub fn trail(&self) -> &[Point] {
        &self.trail
    }

    pub fn outcome(&self) -> Option<EpisodeOutcome> {
        self.outcome
    }

    fn enter(&mut self, state: RobotState) {
        if self.state != state {
            info!("Robot {} -> {}", self.state.as_str(), state.as_str());
            self.state = state;
        }
    }

    fn finish(&mut self, outcome: EpisodeOutcome) -> TickAction {
        info!(
            "Episode over: {} ({} of {} items delivered, charge {:.1})",
            outcome.as_str(),
            self.collected,
            self.total_items,
            self.charge
        );
        self.outcome = Some(outcome);
        TickAction::Finished(outcome)
    }

    /// Drops the current route and any search in flight, and completes a
    /// step that is still being interpolated.
    pub fn abandon_route(&mut self, pathfinder: &mut Pathfinder) {
        self.path.clear();
        pathfinder.clear();
        self.motion.snap(&mut self.rect);
    }

    /// Runs one decision tick.
    ///
    /// Each tick does at most one conclusive thing: a state transition, a
    /// planning step, or a single committed move. The field is read through
    /// `fixtures`; the only thing the robot changes on it is `items`.
    pub fn tick(
        &mut self,
        config: &SimConfig,
        fixtures: &Fixtures<'_>,
        items: &mut dyn ItemStore,
        pathfinder: &mut Pathfinder,
        mode: Mode,
    ) -> TickAction {
        if let Some(outcome) = self.outcome {
            return TickAction::Finished(outcome);
        }
        if self.charge <= 0.0 {
            self.enter(RobotState::Dead);
            self.abandon_route(pathfinder);
            return self.finish(EpisodeOutcome::Dead);
        }
        if self.motion.is_moving() {
            return TickAction::Idle;
        }

        match self.state {
            RobotState::Dead => return self.finish(EpisodeOutcome::Dead),
            RobotState::Stuck => return self.finish(EpisodeOutcome::Stuck),
            RobotState::Recharging => return self.recharge(config),
            RobotState::Seeking | RobotState::Collecting | RobotState::Charging => {}
        }

        // A goal reached on the last step is claimed before low battery
        // can pre-empt it.
        if self.path.is_empty() && !pathfinder.is_searching() {
            if let Some(action) = self.handle_arrival(fixtures, items, pathfinder) {
                return action;
            }
        }

        if self.charge <= config.emergency_charge
            && !matches!(self.state, RobotState::Charging | RobotState::Recharging)
        {
            self.divert_to_station(items, pathfinder);
            return TickAction::Transitioned(self.state);
        }

        if let Some(waypoint) = self.path.pop_front() {
            self.commit_step(config, waypoint, mode);
            return TickAction::Moved(waypoint);
        }

        if pathfinder.is_searching() {
            return self.advance_search(config, pathfinder);
        }

        self.plan(config, fixtures, items.items(), pathfinder, mode)
    }

    /// Moves the interpolated footprint by one frame. Normal mode only.
    pub fn animate(&mut self, speed: i32) {
        if self.state == RobotState::Dead {
            return;
        }
        self.motion.advance(&mut self.rect, speed);
    }

    fn recharge(&mut self, config: &SimConfig) -> TickAction {
        self.charge = (self.charge + config.recharge_rate).min(config.max_charge);
        if self.charge >= config.max_charge {
            self.enter(RobotState::Seeking);
            return TickAction::Transitioned(self.state);
        }
        TickAction::Recharged
    }

    /// Abandons the current task for the charging station. A carried item
    /// goes back on the field where the robot stands.
    fn divert_to_station(&mut self, items: &mut dyn ItemStore, pathfinder: &mut Pathfinder) {
        if self.carrying {
            let here = self.position();
            warn!("Battery low ({:.1}), dropping item at {:?}", self.charge, here);
            items.drop_item(here);
            self.carrying = false;
        }
        self.target_item = None;
        self.path.clear();
        pathfinder.clear();
        self.enter(RobotState::Charging);
    }

    /// Charge is paid when a step is committed, not when it is planned.
    fn commit_step(&mut self, config: &SimConfig, waypoint: Point, mode: Mode) {
        self.charge = (self.charge - config.charge_per_move).max(0.0);
        match mode {
            Mode::Inspection => motion::teleport(&mut self.rect, waypoint, config.cell_size),
            Mode::Normal => self.motion.begin(&self.rect, waypoint, config.cell_size),
        }
        self.trail.push(waypoint);
    }

    fn advance_search(&mut self, config: &SimConfig, pathfinder: &mut Pathfinder) -> TickAction {
        match pathfinder.step() {
            SearchStep::InProgress => TickAction::Planned,
            SearchStep::Found(path) => {
                self.accept_route(path);
                TickAction::Planned
            }
            SearchStep::NoPath => {
                pathfinder.clear();
                self.register_failure(config)
            }
        }
    }

    fn accept_route(&mut self, path: Vec<Point>) {
        debug!(
            "Route of {} steps while {}",
            path.len(),
            self.state.as_str()
        );
        self.path = path.into();
        self.stuck_count = 0;
    }

    fn register_failure(&mut self, config: &SimConfig) -> TickAction {
        self.stuck_count += 1;
        warn!(
            "No route while {} (attempt {} of {})",
            self.state.as_str(),
            self.stuck_count,
            config.max_stuck_retries
        );
        if self.stuck_count >= config.max_stuck_retries {
            self.enter(RobotState::Stuck);
            return self.finish(EpisodeOutcome::Stuck);
        }
        TickAction::Blocked
    }

    /// Processes reaching the goal of the current state, if the robot is there.
    ///
    /// Items are points and are picked up when the footprint covers them.
    /// The basket and the station are areas the footprint must fully enter.
    fn handle_arrival(
        &mut self,
        fixtures: &Fixtures<'_>,
        items: &mut dyn ItemStore,
        pathfinder: &mut Pathfinder,
    ) -> Option<TickAction> {
        match self.state {
            RobotState::Seeking => {
                let item = self.target_item?;
                if !self.rect.contains_point(item) {
                    return None;
                }
                if !items.take_item(item) {
                    // Gone from the field; pick another one.
                    self.target_item = None;
                    return None;
                }
                self.carrying = true;
                self.target_item = None;
                pathfinder.clear();
                self.enter(RobotState::Collecting);
                Some(TickAction::Transitioned(self.state))
            }
            RobotState::Collecting => {
                if !fixtures.basket.contains_rect(&self.rect) {
                    return None;
                }
                self.collected += 1;
                self.carrying = false;
                pathfinder.clear();
                info!("Delivered item {} of {}", self.collected, self.total_items);
                if self.collected >= self.total_items {
                    return Some(self.finish(EpisodeOutcome::Success));
                }
                self.enter(RobotState::Seeking);
                Some(TickAction::Transitioned(self.state))
            }
            RobotState::Charging => {
                if !fixtures.station.contains_rect(&self.rect) {
                    return None;
                }
                pathfinder.clear();
                self.enter(RobotState::Recharging);
                Some(TickAction::Transitioned(self.state))
            }
            RobotState::Recharging | RobotState::Dead | RobotState::Stuck => None,
        }
    }

    /// Nearest item, by manhattan distance, that a trial search can reach.
    ///
    /// Ties keep the world's item order. The trial relies on the goal cell
    /// being exempt from `obstacles`, so the item's own cell never blocks it.
    fn select_item(
        &self,
        layout: &GridLayout,
        items: &[Point],
        obstacles: &HashSet<GridCell>,
    ) -> Option<(Point, Vec<Point>)> {
        let here = self.position();
        let mut candidates = items.to_vec();
        candidates.sort_by_key(|item| here.manhattan(item));
        candidates.into_iter().find_map(|item| {
            let route = find_path(layout, here, item, obstacles);
            if route.is_none() {
                debug!("Item at {:?} is unreachable, skipping", item);
            }
            route.map(|route| (item, route))
        })
    }

    fn plan(
        &mut self,
        config: &SimConfig,
        fixtures: &Fixtures<'_>,
        items: &[Point],
        pathfinder: &mut Pathfinder,
        mode: Mode,
    ) -> TickAction {
        let layout = *pathfinder.layout();
        let mut obstacles = fixtures.obstacle_cells(&layout, items);

        let (goal, trial_route) = match self.state {
            RobotState::Seeking => {
                if items.is_empty() {
                    return TickAction::Idle;
                }
                match self.select_item(&layout, items, &obstacles) {
                    Some((item, route)) => {
                        self.target_item = Some(item);
                        obstacles.remove(&layout.cell_of(item));
                        (item, Some(route))
                    }
                    None => {
                        self.target_item = None;
                        return self.register_failure(config);
                    }
                }
            }
            RobotState::Collecting => (fixtures.basket.center(), None),
            RobotState::Charging => (fixtures.station.center(), None),
            RobotState::Recharging | RobotState::Dead | RobotState::Stuck => {
                return TickAction::Idle;
            }
        };

        match mode {
            Mode::Inspection => {
                pathfinder.start_search(self.position(), goal, obstacles);
                TickAction::Planned
            }
            Mode::Normal => {
                let route =
                    trial_route.or_else(|| find_path(&layout, self.position(), goal, &obstacles));
                match route {
                    Some(route) => {
                        self.accept_route(route);
                        TickAction::Planned
                    }
                    None => self.register_failure(config),
                }
            }
        }
    }
}
