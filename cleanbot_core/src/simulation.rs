//! Drives one episode: owns the field, the robot and the pathfinder, and turns
//! front end input into decision ticks.

use std::time::Duration;

use log::info;
use rand::{SeedableRng, rngs::StdRng};

use crate::{
    EpisodeOutcome,
    config::SimConfig,
    map::GridLayout,
    pathfinder::Pathfinder,
    robot::{Mode, Robot, TickAction},
    world::{ItemStore, World, WorldError},
};

fn log_episode(world: &World) {
    info!(
        "New episode: {} items, {} obstacles, robot at {:?}",
        world.items().len(),
        world.obstacles().len(),
        world.robot_start()
    );
}

/// Whether the episode is advancing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Running,
    Paused,
    Finished(EpisodeOutcome),
}

/// Where a reset takes its layout from.
#[derive(Debug, Clone)]
enum LayoutSource {
    /// A fresh random layout on every reset, drawn from one seeded generator.
    Generated(StdRng),
    /// The same layout every time.
    Fixed(World),
}

pub struct Simulation {
    config: SimConfig,
    layout: GridLayout,
    world: World,
    robot: Robot,
    pathfinder: Pathfinder,
    mode: Mode,
    phase: Phase,
    last_decision: Option<Duration>,
    hold: bool,
    step_requested: bool,
    decisions: u64,
    source: LayoutSource,
}

impl Simulation {
    /// Starts an episode on a layout generated from `seed`.
    pub fn generated(config: SimConfig, seed: u64) -> Result<Self, WorldError> {
        let mut rng = StdRng::seed_from_u64(seed);
        let world = World::generate(&config, &mut rng)?;
        Ok(Self::from_parts(config, world, LayoutSource::Generated(rng)))
    }

    /// Starts an episode on a fixed layout. Resets restore this layout.
    pub fn with_world(config: SimConfig, world: World) -> Self {
        let source = LayoutSource::Fixed(world.clone());
        Self::from_parts(config, world, source)
    }

    fn from_parts(config: SimConfig, world: World, source: LayoutSource) -> Self {
        let layout = GridLayout::from_config(&config);
        let robot = Robot::new(world.robot_start(), &config, world.items().len());
        log_episode(&world);
        Simulation {
            config,
            layout,
            world,
            robot,
            pathfinder: Pathfinder::new(layout),
            mode: Mode::Normal,
            phase: Phase::Running,
            last_decision: None,
            hold: false,
            step_requested: false,
            decisions: 0,
            source,
        }
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn layout(&self) -> &GridLayout {
        &self.layout
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn robot(&self) -> &Robot {
        &self.robot
    }

    pub fn pathfinder(&self) -> &Pathfinder {
        &self.pathfinder
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_holding(&self) -> bool {
        self.hold
    }

    /// Decision ticks run since the episode started.
    pub fn decisions(&self) -> u64 {
        self.decisions
    }

    pub fn outcome(&self) -> Option<EpisodeOutcome> {
        match self.phase {
            Phase::Finished(outcome) => Some(outcome),
            Phase::Running | Phase::Paused => None,
        }
    }

    /// Advances one frame at time `now`, measured from any fixed origin.
    ///
    /// In normal mode a decision tick runs once the cooldown has passed and
    /// the robot is not mid-step, and the robot's motion is interpolated every
    /// frame. In inspection mode decision ticks only run on request.
    pub fn update(&mut self, now: Duration) -> Option<EpisodeOutcome> {
        if self.phase != Phase::Running {
            return self.outcome();
        }
        match self.mode {
            Mode::Normal => {
                let cooldown = Duration::from_millis(self.config.decision_cooldown_ms);
                let due = self
                    .last_decision
                    .is_none_or(|last| now.saturating_sub(last) >= cooldown);
                if due && !self.robot.is_moving() {
                    self.decide();
                    self.last_decision = Some(now);
                }
                self.robot.animate(self.config.animation_speed);
            }
            Mode::Inspection => {
                if self.step_requested || self.hold {
                    self.step_requested = false;
                    self.decide();
                }
            }
        }
        self.outcome()
    }

    fn decide(&mut self) -> TickAction {
        let (fixtures, items) = self.world.split_mut();
        let action = self.robot.tick(
            &self.config,
            &fixtures,
            items,
            &mut self.pathfinder,
            self.mode,
        );
        self.decisions += 1;
        if let TickAction::Finished(outcome) = action {
            self.phase = Phase::Finished(outcome);
        }
        action
    }

    /// Switches between normal and inspection mode. Any route or search in
    /// flight is dropped and an unfinished step completes immediately.
    pub fn toggle_inspection(&mut self) {
        self.mode = match self.mode {
            Mode::Normal => Mode::Inspection,
            Mode::Inspection => Mode::Normal,
        };
        self.robot.abandon_route(&mut self.pathfinder);
        self.step_requested = false;
        self.last_decision = None;
        info!("Switched to {:?} mode", self.mode);
    }

    /// Requests one decision tick on the next frame. Inspection mode only.
    pub fn single_step(&mut self) {
        if self.mode == Mode::Inspection && self.phase == Phase::Running {
            self.step_requested = true;
        }
    }

    /// While held, inspection mode runs a decision tick every frame.
    pub fn set_hold(&mut self, hold: bool) {
        self.hold = hold;
    }

    pub fn toggle_pause(&mut self) {
        self.phase = match self.phase {
            Phase::Running => Phase::Paused,
            Phase::Paused => Phase::Running,
            finished @ Phase::Finished(_) => finished,
        };
    }

    /// Starts a new episode. A generated source produces a new layout, a
    /// fixed one restores the original. The mode is kept.
    pub fn reset(&mut self) -> Result<(), WorldError> {
        let world = match &mut self.source {
            LayoutSource::Generated(rng) => World::generate(&self.config, rng)?,
            LayoutSource::Fixed(world) => world.clone(),
        };
        log_episode(&world);
        self.robot = Robot::new(world.robot_start(), &self.config, world.items().len());
        self.world = world;
        self.pathfinder.clear();
        self.phase = Phase::Running;
        self.last_decision = None;
        self.hold = false;
        self.step_requested = false;
        self.decisions = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{GridCell, robot::RobotState, world::load_world_from_string};

    const FRAME: Duration = Duration::from_millis(16);

    fn small() -> Simulation {
        let config = SimConfig::default();
        let world = load_world_from_string("RB .. BL\nST .. BK", &config).unwrap();
        Simulation::with_world(config, world)
    }

    fn run_to_end(sim: &mut Simulation) -> EpisodeOutcome {
        let mut now = Duration::ZERO;
        for _ in 0..10_000 {
            if let Some(outcome) = sim.update(now) {
                return outcome;
            }
            now += FRAME;
        }
        panic!("episode did not finish");
    }

    #[test]
    fn normal_mode_waits_for_the_cooldown() {
        let mut sim = small();
        sim.update(Duration::ZERO);
        assert_eq!(sim.decisions(), 1);
        assert_eq!(sim.robot().path().len(), 2);

        sim.update(Duration::from_millis(50));
        assert_eq!(sim.decisions(), 1);

        sim.update(Duration::from_millis(100));
        assert_eq!(sim.decisions(), 2);
        assert_eq!(sim.robot().path().len(), 1);
        assert!(sim.robot().is_moving());
    }

    #[test]
    fn delivers_the_only_item() {
        let mut sim = small();
        assert_eq!(run_to_end(&mut sim), EpisodeOutcome::Success);
        assert_eq!(sim.robot().collected(), 1);
        assert!(sim.world().items().is_empty());
        // Three committed steps: two to the item, one to the basket.
        assert_eq!(sim.robot().trail().len(), 4);
        assert_eq!(sim.robot().charge(), 600.0 - 3.0 * 2.0);

        let decisions = sim.decisions();
        assert_eq!(sim.update(Duration::from_secs(60)), Some(EpisodeOutcome::Success));
        assert_eq!(sim.decisions(), decisions);
    }

    #[test]
    fn inspection_mode_ticks_on_request() {
        let mut sim = small();
        sim.toggle_inspection();
        for frame in 0..10 {
            sim.update(FRAME * frame);
        }
        assert_eq!(sim.decisions(), 0);

        sim.single_step();
        sim.update(Duration::ZERO);
        sim.update(FRAME);
        assert_eq!(sim.decisions(), 1);
        assert!(sim.pathfinder().is_searching());

        sim.set_hold(true);
        for frame in 0..5 {
            sim.update(FRAME * frame);
        }
        assert_eq!(sim.decisions(), 6);
        sim.set_hold(false);
    }

    #[test]
    fn inspection_mode_finishes_the_episode() {
        let mut sim = small();
        sim.toggle_inspection();
        sim.set_hold(true);
        assert_eq!(run_to_end(&mut sim), EpisodeOutcome::Success);
    }

    #[test]
    fn switching_modes_drops_the_route() {
        let mut sim = small();
        sim.update(Duration::ZERO);
        sim.update(Duration::from_millis(100));
        assert!(sim.robot().is_moving());

        sim.toggle_inspection();
        assert_eq!(sim.mode(), Mode::Inspection);
        assert!(sim.robot().path().is_empty());
        assert!(!sim.robot().is_moving());
        assert_eq!(
            sim.layout().cell_of(sim.robot().position()),
            GridCell::new(1, 2)
        );
    }

    #[test]
    fn paused_episode_does_not_advance() {
        let mut sim = small();
        sim.toggle_pause();
        assert_eq!(sim.phase(), Phase::Paused);
        sim.update(Duration::ZERO);
        assert_eq!(sim.decisions(), 0);
        sim.toggle_pause();
        sim.update(Duration::ZERO);
        assert_eq!(sim.decisions(), 1);
    }

    #[test]
    fn reset_restores_a_fixed_layout() {
        let mut sim = small();
        sim.toggle_inspection();
        sim.set_hold(true);
        run_to_end(&mut sim);

        sim.reset().unwrap();
        assert_eq!(sim.phase(), Phase::Running);
        assert_eq!(sim.mode(), Mode::Inspection);
        assert_eq!(sim.world().items().len(), 1);
        assert_eq!(sim.robot().state(), RobotState::Seeking);
        assert_eq!(sim.robot().collected(), 0);
        assert_eq!(sim.decisions(), 0);
    }

    #[test]
    fn generated_episodes_hold_the_configured_items() {
        let mut sim = Simulation::generated(SimConfig::default(), 42).unwrap();
        assert_eq!(sim.world().items().len(), 10);
        assert_eq!(sim.robot().total_items(), 10);
        let first = sim.world().clone();

        sim.reset().unwrap();
        assert_eq!(sim.world().items().len(), 10);
        assert_ne!(sim.world(), &first);
    }
}
