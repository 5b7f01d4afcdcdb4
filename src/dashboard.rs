//! Live terminal dashboard.
//!
//! Redraws the whole screen whenever a latency update arrives or the terminal
//! is resized. Esc ends the loop; the terminal is restored before the task
//! returns so nothing printed afterwards lands on the alternate screen.

use std::io::{self, Stdout};

use anyhow::{anyhow, Context, Result};
use crossterm::event::{Event, EventStream, KeyCode, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use futures_util::StreamExt;
use ratatui::backend::CrosstermBackend;
use ratatui::buffer::Buffer;
use ratatui::layout::Rect;
use ratatui::style::Style;
use ratatui::widgets::Widget;
use ratatui::Terminal;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::format::{format_latency, Align, PLACEHOLDER};
use crate::graph::Graph;
use crate::palette;
use crate::shutdown::{ShutdownController, ShutdownReceiver};
use crate::stats::LatencyWindow;
use crate::types::{Direction, LatencyUpdate};

type Backend = CrosstermBackend<Stdout>;

const COLUMN_HEADINGS: &str =
    "         total time          client -> server       server -> server       server -> client";

/// Footer x positions of the now/avg pairs, in column order.
const TOTAL_COLUMNS: (i32, i32) = (8, 19);
const BREAKDOWN_COLUMNS: [(i32, i32); 3] = [(31, 42), (54, 65), (77, 88)];

// ============================================================================
// State
// ============================================================================

/// Everything the dashboard shows.
#[derive(Debug)]
pub struct DashboardState {
    user_one: String,
    user_two: String,
    one_to_two: LatencyWindow,
    two_to_one: LatencyWindow,
    breakdown_valid: bool,
}

impl DashboardState {
    /// No samples yet, breakdown valid.
    pub fn new(user_one: String, user_two: String) -> Self {
        Self {
            user_one,
            user_two,
            one_to_two: LatencyWindow::new(),
            two_to_one: LatencyWindow::new(),
            breakdown_valid: true,
        }
    }

    /// Records one round trip; the breakdown flag can only go from valid to
    /// invalid.
    pub fn apply(&mut self, update: LatencyUpdate) {
        self.window_mut(update.direction).update(update.record);
        self.breakdown_valid &= update.breakdown_valid;
    }

    pub fn window(&self, direction: Direction) -> &LatencyWindow {
        match direction {
            Direction::OneToTwo => &self.one_to_two,
            Direction::TwoToOne => &self.two_to_one,
        }
    }

    fn window_mut(&mut self, direction: Direction) -> &mut LatencyWindow {
        match direction {
            Direction::OneToTwo => &mut self.one_to_two,
            Direction::TwoToOne => &mut self.two_to_one,
        }
    }

    fn render_footer_row(&self, buf: &mut Buffer, y: i32, direction: Direction) {
        let (arrow, arrow_style) = match direction {
            Direction::OneToTwo => ("->  ", palette::USER_ONE),
            Direction::TwoToOne => ("<-  ", palette::USER_TWO),
        };
        let pairs = format!("now {PLACEHOLDER}  avg {PLACEHOLDER}   ").repeat(4);
        put(buf, 0, y, &[(arrow, arrow_style), (pairs.as_str(), palette::FRAME)]);

        let window = self.window(direction);
        let (Some(last), Some(mean)) = (window.last(), window.mean()) else {
            return;
        };

        let mut columns = vec![(TOTAL_COLUMNS, last.total, mean.total)];
        if self.breakdown_valid {
            columns.extend(
                BREAKDOWN_COLUMNS
                    .into_iter()
                    .zip(last.segments().into_iter().zip(mean.segments()))
                    .map(|(x, (last, mean))| (x, last, mean)),
            );
        }

        for ((now_x, avg_x), last, mean) in columns {
            let now = format_latency(last, Align::Left);
            let avg = format_latency(mean, Align::Left);
            put(buf, now_x, y, &[(now.as_str(), palette::FRAME_BRIGHT)]);
            put(buf, avg_x, y, &[(avg.as_str(), palette::FRAME_BRIGHT)]);
        }
    }
}

/// Writes `spans` left to right from `(x, y)`, dropping whatever falls outside
/// the buffer.
fn put(buf: &mut Buffer, x: i32, y: i32, spans: &[(&str, Style)]) {
    if y < 0 {
        return;
    }
    let mut x = x;
    for &(text, style) in spans {
        for ch in text.chars() {
            if x >= 0 {
                if let Some(cell) = buf.cell_mut((x as u16, y as u16)) {
                    cell.set_char(ch).set_style(style);
                }
            }
            x += 1;
        }
    }
}

impl Widget for &DashboardState {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let left = i32::from(area.x);
        let top = i32::from(area.y);
        let width = i32::from(area.width);
        let height = i32::from(area.height);
        let blank = " ".repeat(area.width as usize);

        put(buf, left, top, &[(blank.as_str(), palette::FRAME)]);
        put(
            buf,
            left,
            top,
            &[
                (self.user_one.as_str(), palette::USER_ONE),
                (" <-", palette::USER_TWO),
                ("-> ", palette::USER_ONE),
                (self.user_two.as_str(), palette::USER_TWO),
            ],
        );
        let quit_hint = [
            ("press ", palette::FRAME),
            ("Esc", palette::FRAME_BRIGHT),
            (" to quit", palette::FRAME),
        ];
        let hint_width: i32 = quit_hint.iter().map(|(text, _)| text.chars().count() as i32).sum();
        put(buf, left + width - hint_width, top, &quit_hint);

        let top_rule = "▔".repeat(area.width as usize);
        put(buf, left, top + 1, &[(top_rule.as_str(), palette::GRAPH)]);
        for y in 2..height - 4 {
            put(buf, left, top + y, &[(blank.as_str(), palette::GRAPH)]);
        }
        if height > 6 {
            let graph_area = Rect::new(area.x, area.y + 2, area.width, area.height - 6);
            Graph {
                one_to_two: &self.one_to_two,
                two_to_one: &self.two_to_one,
            }
            .render(graph_area, buf);
        }
        let bottom_rule = "▁".repeat(area.width as usize);
        put(buf, left, top + height - 4, &[(bottom_rule.as_str(), palette::GRAPH)]);

        for y in height - 3..height {
            put(buf, left, top + y, &[(blank.as_str(), palette::FRAME)]);
        }
        put(buf, left, top + height - 3, &[(COLUMN_HEADINGS, palette::FRAME)]);
        self.render_footer_row(buf, top + height - 2, Direction::OneToTwo);
        self.render_footer_row(buf, top + height - 1, Direction::TwoToOne);
    }
}

// ============================================================================
// Render task
// ============================================================================

/// Handle to the running dashboard task.
pub struct Dashboard {
    updates: mpsc::UnboundedSender<LatencyUpdate>,
    stop: ShutdownController,
    exited: ShutdownReceiver,
    task: JoinHandle<Result<()>>,
}

impl Dashboard {
    /// Takes over the terminal and starts the render loop. Fails before
    /// anything is drawn if the terminal cannot be set up.
    pub fn start(user_one: String, user_two: String) -> Result<Self> {
        let terminal = init_terminal().context("unable to initialize terminal UI")?;

        let (updates, updates_rx) = mpsc::unbounded_channel();
        let stop = ShutdownController::new();
        let exited = ShutdownController::new();
        let exited_rx = exited.subscribe();
        let state = DashboardState::new(user_one, user_two);

        let task = tokio::spawn(run(terminal, state, updates_rx, stop.subscribe(), exited));

        Ok(Self {
            updates,
            stop,
            exited: exited_rx,
            task,
        })
    }

    /// Channel for the driver's round-trip results.
    pub fn updates(&self) -> mpsc::UnboundedSender<LatencyUpdate> {
        self.updates.clone()
    }

    /// Fires once the render loop has ended and the terminal is restored,
    /// whatever the reason.
    pub fn exited(&self) -> ShutdownReceiver {
        self.exited.clone()
    }

    /// Stops the render loop if it is still running and waits until the
    /// terminal has been restored.
    pub async fn shutdown(self) -> Result<()> {
        self.stop.shutdown();
        match self.task.await {
            Ok(result) => result,
            Err(error) => Err(anyhow!("dashboard task failed: {error}")),
        }
    }
}

// ============================================================================
// Terminal
// ============================================================================

/// Raw mode plus alternate screen. Anything already set up is undone when a
/// later step fails.
fn init_terminal() -> Result<Terminal<Backend>> {
    enable_raw_mode().context("enable raw mode")?;
    let setup = || -> Result<Terminal<Backend>> {
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen).context("enter alternate screen")?;
        let mut terminal = Terminal::new(CrosstermBackend::new(stdout)).context("create terminal")?;
        terminal.hide_cursor().context("hide cursor")?;
        terminal.clear().context("clear terminal")?;
        Ok(terminal)
    };
    setup().inspect_err(|_| {
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
        let _ = disable_raw_mode();
    })
}

fn restore_terminal(terminal: &mut Terminal<Backend>) -> Result<()> {
    disable_raw_mode().context("disable raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen).context("leave alternate screen")?;
    terminal.show_cursor().context("show cursor")?;
    Ok(())
}

async fn run(
    mut terminal: Terminal<Backend>,
    mut state: DashboardState,
    mut updates: mpsc::UnboundedReceiver<LatencyUpdate>,
    mut stop: ShutdownReceiver,
    exited: ShutdownController,
) -> Result<()> {
    let result = event_loop(&mut terminal, &mut state, &mut updates, &mut stop).await;
    let restored = restore_terminal(&mut terminal);
    exited.shutdown();
    result.and(restored)
}

fn draw(terminal: &mut Terminal<Backend>, state: &DashboardState) -> Result<()> {
    terminal
        .draw(|frame| frame.render_widget(state, frame.area()))
        .context("draw dashboard")?;
    Ok(())
}

/// Redraws on every update and resize until Esc is pressed or `stop` fires.
async fn event_loop(
    terminal: &mut Terminal<Backend>,
    state: &mut DashboardState,
    updates: &mut mpsc::UnboundedReceiver<LatencyUpdate>,
    stop: &mut ShutdownReceiver,
) -> Result<()> {
    let mut events = EventStream::new();
    draw(terminal, state)?;

    loop {
        tokio::select! {
            _ = stop.wait() => return Ok(()),
            Some(update) = updates.recv() => {
                state.apply(update);
                draw(terminal, state)?;
            }
            maybe_event = events.next() => match maybe_event {
                Some(Ok(Event::Resize(..))) => {
                    terminal.clear().context("clear terminal")?;
                    draw(terminal, state)?;
                }
                Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press && key.code == KeyCode::Esc => {
                    return Ok(());
                }
                Some(Ok(_)) => {}
                Some(Err(error)) => return Err(error).context("read terminal events"),
                None => return Ok(()),
            },
        }
    }
}
