use std::{io::stdout, path::PathBuf, time::Duration};

use crate::gui::error::GuiError;

use crossterm::{
    event::{self, KeyCode, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use ratatui::{
    prelude::*,
    widgets::{
        block::{Position, Title},
        *,
    },
    Terminal,
};

/// Where the cursor is in the port list, and what the user decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorState {
    cursor: usize,
    n_ports: usize,
    done: Option<Option<usize>>,
}

impl SelectorState {
    /// Starts on the first port that looks like a Pico's USB serial, or on
    /// the first port if none does.
    pub fn new(ports: &[PathBuf]) -> Self {
        let cursor = ports
            .iter()
            .position(|p| {
                let name = p.to_string_lossy();
                name.contains("ttyACM") || name.contains("usbmodem")
            })
            .unwrap_or(0);
        Self {
            cursor,
            n_ports: ports.len(),
            done: None,
        }
    }

    /// The highlighted entry.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// `Some(Some(i))` once a port was picked, `Some(None)` if the user
    /// quit, `None` while still choosing.
    pub fn outcome(&self) -> Option<Option<usize>> {
        self.done
    }

    /// Applies one key press.
    pub fn on_key(&mut self, code: KeyCode) {
        if self.n_ports == 0 {
            self.done = Some(None);
            return;
        }
        match code {
            KeyCode::Down | KeyCode::Char('j') => {
                self.cursor = (self.cursor + 1) % self.n_ports;
            }
            KeyCode::Up | KeyCode::Char('k') => {
                self.cursor = (self.cursor + self.n_ports - 1) % self.n_ports;
            }
            KeyCode::Enter => self.done = Some(Some(self.cursor)),
            KeyCode::Char('q') | KeyCode::Esc => self.done = Some(None),
            _ => {}
        }
    }
}

fn draw(
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    ports: &[PathBuf],
    state: &SelectorState,
) -> Result<(), GuiError> {
    let title = Title::from(" Select the Pico ".magenta().bold());
    let instructions = Title::from(Line::from(vec![
        " Navigate ".into(),
        "<Up>/<Down>".magenta().bold(),
        " Select ".into(),
        "<Enter>".magenta().bold(),
        " Quit ".into(),
        "<Q> ".magenta().bold(),
    ]));
    let block = Block::default()
        .title(title.alignment(Alignment::Center))
        .title(
            instructions
                .alignment(Alignment::Center)
                .position(Position::Bottom),
        )
        .borders(Borders::ALL);
    let list = List::new(ports.iter().map(|p| p.to_string_lossy()))
        .style(Style::default().fg(Color::White))
        .highlight_symbol(">>")
        .highlight_style(Style::default().fg(Color::Magenta))
        .block(block);
    let mut list_state = ListState::default().with_selected(Some(state.cursor()));

    terminal.draw(|frame| {
        let area = frame.size();
        frame.render_stateful_widget(list, area, &mut list_state);
    })?;
    Ok(())
}

fn select_loop(ports: &[PathBuf]) -> Result<Option<usize>, GuiError> {
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;
    terminal.clear()?;

    let mut state = SelectorState::new(ports);
    loop {
        if let Some(outcome) = state.outcome() {
            return Ok(outcome);
        }
        draw(&mut terminal, ports, &state)?;
        if event::poll(Duration::from_millis(16))? {
            if let event::Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    state.on_key(key.code);
                }
            }
        }
    }
}

/// Lets the user pick one of `available_ports` in a full screen list.
/// Returns `None` if they quit instead.
pub fn port_selector(mut available_ports: Vec<PathBuf>) -> Result<Option<PathBuf>, GuiError> {
    if available_ports.is_empty() {
        return Err(GuiError::NoPorts);
    }

    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;

    let selected = select_loop(&available_ports);

    // restore the terminal whether or not the loop failed
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    Ok(selected?.map(|i| available_ports.swap_remove(i)))
}
