use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::prelude::*;
use std::io::{self, stdout};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::audio::{AudioLineRegistry, CaptureSession, FrameExchange, PulseBackend};
use crate::config::{Config, OCTAVE_RESOLUTIONS, SUPPORTED_SAMPLE_RATES};
use crate::visualizer::{BarPipeline, BarVisualizer};

pub async fn run(config: Config) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen)?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;

    let result = run_app(&mut terminal, config).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    mut config: Config,
) -> Result<()> {
    let registry = Arc::new(AudioLineRegistry::new(Arc::new(PulseBackend)));
    let exchange = Arc::new(FrameExchange::new());
    let session = Arc::new(CaptureSession::new(
        registry,
        Arc::clone(&exchange),
        config.audio.capture_settings(),
    ));

    // A missing device is not fatal; bars stay empty until a restart succeeds.
    if let Err(e) = session.start() {
        warn!("Audio capture unavailable: {}", e);
    }

    let mut pipeline = BarPipeline::new(exchange);
    let period = Duration::from_secs_f64(1.0 / config.display.fps as f64);
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let result = loop {
        interval.tick().await;

        let heights = pipeline.next_frame(
            &config.spectrum,
            &config.smoothing,
            &config.bars,
            Instant::now(),
        );
        let visualizer = BarVisualizer {
            bar_width: config.display.bar_width,
            bar_spacing: config.display.bar_spacing,
            mirror: config.display.mirror,
        };

        let drawn = terminal.draw(|frame| {
            let area = frame.area();

            // Clear with transparent/reset background for terminal transparency support
            let block = ratatui::widgets::Block::default().style(Style::default().bg(Color::Reset));
            frame.render_widget(block, area);

            let bars_area = Rect::new(
                area.x,
                area.y + 1,
                area.width,
                area.height.saturating_sub(1),
            );
            visualizer.render(
                frame,
                bars_area,
                &heights,
                config.bars.max_height,
                &config.display.color_scheme,
            );

            render_status(frame, area, &config, session.is_running());
        });
        if let Err(e) = drawn {
            break Err(e.into());
        }

        match handle_input(&mut config, &session) {
            Ok(true) => break Ok(()),
            Ok(false) => {}
            Err(e) => break Err(e),
        }
    };

    session.dispose();
    result
}

/// Drain pending key events. Returns true when the user asked to quit.
fn handle_input(config: &mut Config, session: &Arc<CaptureSession>) -> Result<bool> {
    while event::poll(Duration::ZERO)? {
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }

        match key {
            KeyEvent {
                code: KeyCode::Char('q') | KeyCode::Esc,
                ..
            }
            | KeyEvent {
                code: KeyCode::Char('c'),
                modifiers: KeyModifiers::CONTROL,
                ..
            } => {
                return Ok(true);
            }
            KeyEvent {
                code: KeyCode::Char('c'),
                ..
            } => {
                config.display.color_scheme = config.display.color_scheme.next();
            }
            KeyEvent {
                code: KeyCode::Char('w'),
                ..
            } => {
                config.spectrum.weighting = config.spectrum.weighting.next();
            }
            KeyEvent {
                code: KeyCode::Char('o'),
                ..
            } => {
                config.spectrum.bands_per_octave =
                    next_in(&OCTAVE_RESOLUTIONS, config.spectrum.bands_per_octave);
            }
            KeyEvent {
                code: KeyCode::Char('m'),
                ..
            } => {
                config.smoothing.mode = config.smoothing.mode.next();
            }
            KeyEvent {
                code: KeyCode::Char('l'),
                ..
            } => {
                config.spectrum.level = config.spectrum.level.next();
            }
            KeyEvent {
                code: KeyCode::Char('r'),
                ..
            } => {
                let previous = config.audio.clone();
                config.audio.sample_rate =
                    next_in(&SUPPORTED_SAMPLE_RATES, config.audio.sample_rate);
                if previous.requires_restart(&config.audio) {
                    info!("Restarting capture at {} Hz", config.audio.sample_rate);
                    session.set_settings(config.audio.capture_settings());
                    session.restart_async();
                }
            }
            _ => {}
        }
    }
    Ok(false)
}

/// The entry after `current`, wrapping; the first entry if `current` is absent.
fn next_in<T: Copy + PartialEq>(choices: &[T], current: T) -> T {
    match choices.iter().position(|&c| c == current) {
        Some(i) => choices[(i + 1) % choices.len()],
        None => choices[0],
    }
}

fn render_status(frame: &mut Frame, area: Rect, config: &Config, capturing: bool) {
    let status = format!(
        " [w]eight: {} | [o]ct: 1/{} | [m]ode: {} | [l]evel: {} | \
         [c]olor: {} | [r]ate: {} Hz{} | [q]uit ",
        config.spectrum.weighting,
        config.spectrum.bands_per_octave,
        config.smoothing.mode.name(),
        config.spectrum.level.name(),
        config.display.color_scheme.name(),
        config.audio.sample_rate,
        if capturing { "" } else { " (no capture)" },
    );

    for (i, ch) in status.chars().enumerate() {
        if i < area.width as usize {
            let cell = frame.buffer_mut().cell_mut((area.x + i as u16, area.y));
            if let Some(cell) = cell {
                cell.set_char(ch);
                cell.set_fg(Color::DarkGray);
            }
        }
    }
}
