use cleanbot_core::{
    GridCell,
    config::SimConfig,
    map::GridLayout,
    robot::{Mode, Robot, RobotState},
    simulation::{Phase, Simulation},
    world::{Tile, load_world_from_string},
};
use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use ratatui::{
    crossterm::{
        self,
        event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
        execute,
        terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
    },
    prelude::*,
    widgets::*,
};
use std::{
    collections::HashSet,
    fs::File,
    io::{self, Stdout},
    path::{Path, PathBuf},
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Map file to load instead of a generated layout
    #[arg(short, long, value_name = "MAP_FILE")]
    map: Option<PathBuf>,

    /// TOML configuration file
    #[arg(short, long, value_name = "CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Seed for generated layouts
    #[arg(short, long)]
    seed: Option<u64>,

    /// File the log is written to
    #[arg(long, value_name = "LOG_FILE", default_value = "cleanbot.log")]
    log_file: PathBuf,
}

struct App {
    /// The episode being shown.
    simulation: Simulation,
    /// Origin of the simulation clock.
    started: Instant,
    /// Flag to control the main loop.
    should_quit: bool,
}

impl App {
    fn new(args: &Args) -> Result<Self> {
        let config = match &args.config {
            Some(path) => SimConfig::load(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => SimConfig::default(),
        };

        let simulation = match &args.map {
            Some(path) => {
                let map = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read map file {}", path.display()))?;
                let world = load_world_from_string(&map, &config)
                    .with_context(|| format!("Failed to load map {}", path.display()))?;
                Simulation::with_world(config, world)
            }
            None => {
                let seed = args.seed.unwrap_or_else(clock_seed);
                info!("Generating layout from seed {seed}");
                Simulation::generated(config, seed).context("Failed to generate a layout")?
            }
        };

        Ok(App {
            simulation,
            started: Instant::now(),
            should_quit: false,
        })
    }

    /// Advances the simulation by one frame.
    fn tick(&mut self) {
        self.simulation.update(self.started.elapsed());
    }

    fn on_key(&mut self, code: KeyCode) -> Result<()> {
        match code {
            KeyCode::Char('q') | KeyCode::Esc => self.should_quit = true,
            KeyCode::Char(' ') => self.simulation.toggle_pause(),
            KeyCode::Char('r') => self.simulation.reset()?,
            KeyCode::Char('d') => self.simulation.toggle_inspection(),
            KeyCode::Char('s') => self.simulation.single_step(),
            KeyCode::Char('a') => {
                let hold = !self.simulation.is_holding();
                self.simulation.set_hold(hold);
            }
            _ => {}
        }
        Ok(())
    }
}

fn clock_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos() as u64)
        .unwrap_or_default()
}

/// Sends log output to a file so it does not tear the terminal UI.
fn init_logging(path: &Path) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create log file {}", path.display()))?;
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Pipe(Box::new(file)))
        .init();
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_file)?;

    // Build the episode before touching the terminal so errors print normally
    let mut app = App::new(&args)?;

    let mut terminal = setup_terminal()?;
    let result = run_app(&mut terminal, &mut app);
    restore_terminal(&mut terminal)?;
    result
}

/// Configures the terminal for TUI interaction.
fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    let mut stdout = io::stdout();
    enable_raw_mode()?;
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend).map_err(Into::into)
}

/// Restores the terminal to its original state.
fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    Ok(())
}

/// Runs the main loop of the TUI application.
fn run_app(terminal: &mut Terminal<CrosstermBackend<Stdout>>, app: &mut App) -> Result<()> {
    let frame_rate = Duration::from_millis(16);
    let mut last_frame = Instant::now();

    loop {
        terminal.draw(|f| ui(f, app))?;

        let timeout = frame_rate
            .checked_sub(last_frame.elapsed())
            .unwrap_or_else(|| Duration::from_secs(0));

        if crossterm::event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    app.on_key(key.code)?;
                }
            }
        }

        if last_frame.elapsed() >= frame_rate {
            app.tick();
            last_frame = Instant::now();
        }

        if app.should_quit {
            break;
        }
    }
    Ok(())
}

/// Renders the user interface.
fn ui(frame: &mut Frame, app: &App) {
    let main_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(0),    // Field
            Constraint::Length(6), // Battery and status
            Constraint::Length(2), // Help
        ])
        .split(frame.area());

    render_map(frame, main_layout[0], &app.simulation);
    render_status(frame, main_layout[1], &app.simulation);

    let help_text = Paragraph::new(
        "q/Esc quit  space pause  r reset  d inspection  s step  a auto-step",
    )
    .alignment(Alignment::Center)
    .block(Block::default().borders(Borders::TOP));
    frame.render_widget(help_text, main_layout[2]);
}

fn state_color(state: RobotState) -> Color {
    match state {
        RobotState::Seeking => Color::White,
        RobotState::Collecting => Color::Green,
        RobotState::Charging => Color::Yellow,
        RobotState::Recharging => Color::LightYellow,
        RobotState::Dead => Color::Red,
        RobotState::Stuck => Color::Magenta,
    }
}

/// Renders the battery gauge and the robot's task state.
fn render_status(frame: &mut Frame, area: Rect, simulation: &Simulation) {
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(area);

    let robot = simulation.robot();
    let config = simulation.config();
    let ratio = (robot.charge() / config.max_charge).clamp(0.0, 1.0);
    let gauge_color = if robot.charge() <= config.emergency_charge {
        Color::Red
    } else {
        Color::Green
    };
    let gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title("Battery"))
        .gauge_style(Style::default().fg(gauge_color))
        .ratio(ratio)
        .label(format!("{:.0} / {:.0}", robot.charge(), config.max_charge));
    frame.render_widget(gauge, columns[0]);

    let phase = match simulation.phase() {
        Phase::Running => Span::raw("running"),
        Phase::Paused => Span::styled("paused", Style::default().fg(Color::Yellow)),
        Phase::Finished(outcome) => Span::styled(
            outcome.as_str(),
            Style::default().fg(state_color(robot.state())).bold(),
        ),
    };
    let mode = match simulation.mode() {
        Mode::Normal => "normal".to_string(),
        Mode::Inspection => format!(
            "inspection (auto-step {}, {} expansions)",
            if simulation.is_holding() { "on" } else { "off" },
            simulation.pathfinder().expansions()
        ),
    };
    let mut lines = vec![
        Line::from(vec![
            Span::raw("State: "),
            Span::styled(
                robot.state().as_str(),
                Style::default().fg(state_color(robot.state())).bold(),
            ),
            Span::raw(format!(
                "  Carrying: {}  Delivered: {}/{}",
                if robot.is_carrying() { "yes" } else { "no" },
                robot.collected(),
                robot.total_items()
            )),
        ]),
        Line::from(vec![Span::raw("Episode: "), phase]),
        Line::from(format!("Mode: {mode}")),
    ];
    if simulation.mode() == Mode::Inspection {
        lines.push(search_line(simulation));
    }
    let status = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Robot"));
    frame.render_widget(status, columns[1]);
}

/// Scores of the robot's cell in the current search.
fn search_line(simulation: &Simulation) -> Line<'static> {
    let pathfinder = simulation.pathfinder();
    let here = simulation.layout().cell_of(simulation.robot().position());
    let g = pathfinder.g_scores().and_then(|scores| scores.get(&here).copied());
    match (pathfinder.goal(), g, pathfinder.heuristic_to_goal(here)) {
        (Some(goal), Some(g), Some(h)) => Line::from(format!(
            "Search to ({}, {}): g {g}  h {h}  f {}  path {}",
            goal.col,
            goal.row,
            g + h,
            pathfinder.final_path().len()
        )),
        _ => Line::from("Search: idle"),
    }
}

/// Glyph for the robot, pointing where it last moved.
fn robot_glyph(robot: &Robot) -> &'static str {
    match robot.motion().direction() {
        (1, _) => ">>",
        (-1, _) => "<<",
        (_, -1) => "^^",
        _ => "vv",
    }
}

/// f-score of a searched cell, squeezed into two columns.
fn score_span(f: u32, closed: bool) -> Span<'static> {
    let text = if f < 100 { format!("{f:>2}") } else { "++".to_string() };
    let color = if closed { Color::DarkGray } else { Color::Cyan };
    Span::styled(text, Style::default().fg(color))
}

/// Renders the field onto the frame. Every cell takes two columns.
fn render_map(frame: &mut Frame, area: Rect, simulation: &Simulation) {
    let layout: &GridLayout = simulation.layout();
    let tiles = simulation.world().tiles(layout);
    let robot = simulation.robot();
    let robot_cell = layout.cell_of(robot.position());

    let planned: HashSet<GridCell> = robot.path().iter().map(|p| layout.cell_of(*p)).collect();
    let inspecting = simulation.mode() == Mode::Inspection;
    let pathfinder = simulation.pathfinder();
    let closed = pathfinder.closed();

    let mut lines: Vec<Line> = Vec::with_capacity(tiles.height());
    for (y, row) in tiles.rows().enumerate() {
        let mut spans: Vec<Span> = Vec::with_capacity(row.len());
        for (x, tile) in row.iter().enumerate() {
            let cell = GridCell::new(x as i32, layout.first_row + y as i32);
            let span = if cell == robot_cell {
                Span::styled(
                    robot_glyph(robot),
                    Style::default().fg(state_color(robot.state())).bold(),
                )
            } else {
                match tile {
                    Tile::Obstacle => Span::styled("##", Style::default().fg(Color::DarkGray)),
                    Tile::Station => Span::styled("ST", Style::default().fg(Color::Yellow)),
                    Tile::Basket => Span::styled("BK", Style::default().fg(Color::Green)),
                    Tile::Item => Span::styled("()", Style::default().fg(Color::Magenta)),
                    Tile::Floor if inspecting && pathfinder.is_on_final_path(cell) => {
                        Span::styled("**", Style::default().fg(Color::Blue))
                    }
                    Tile::Floor if planned.contains(&cell) => {
                        Span::styled(". ", Style::default().fg(Color::Cyan))
                    }
                    Tile::Floor if inspecting => match pathfinder.f_score(cell) {
                        Some(f) => score_span(f, closed.is_some_and(|c| c.contains(&cell))),
                        None => Span::raw("  "),
                    },
                    Tile::Floor => Span::raw("  "),
                }
            };
            spans.push(span);
        }
        lines.push(Line::from(spans));
    }

    let title = match simulation.mode() {
        Mode::Normal => "Cleanbot",
        Mode::Inspection => "Cleanbot [inspection]",
    };
    let map_paragraph = Paragraph::new(lines)
        .block(Block::default().title(title).borders(Borders::ALL))
        .alignment(Alignment::Center);

    frame.render_widget(map_paragraph, area);
}
