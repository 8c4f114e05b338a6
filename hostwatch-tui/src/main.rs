mod app;
mod ui;

use anyhow::{Context, Result};
use app::App;
use crossterm::{
    event::{self, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use hostwatch_core::{probe, query_service, AccessGate, AgentConfig, Credentials, Sources};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::env;
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

const ENV_CONFIG: &str = "HOSTWATCH_CONFIG";
const ENV_LOG: &str = "HOSTWATCH_TUI_LOG";
const ENV_USER: &str = "HOSTWATCH_USER";
const ENV_PASSWORD: &str = "HOSTWATCH_PASSWORD";

#[tokio::main]
async fn main() -> Result<()> {
    // The terminal belongs to the dashboard; logs go to a file.
    let log_path = env::var(ENV_LOG)
        .map(PathBuf::from)
        .unwrap_or_else(|_| env::temp_dir().join("hostwatch-tui.log"));
    let log_file = File::create(&log_path)
        .with_context(|| format!("cannot open log file {}", log_path.display()))?;
    tracing_subscriber::fmt()
        .with_writer(Mutex::new(log_file))
        .with_ansi(false)
        .init();

    let config_path = env::var(ENV_CONFIG).ok().map(PathBuf::from);
    let config = AgentConfig::load(config_path.as_deref())?;

    let presented = Credentials::new(
        env::var(ENV_USER).unwrap_or_default(),
        env::var(ENV_PASSWORD).unwrap_or_default(),
    );
    let grant = AccessGate::from_config(config.credentials.clone()).authorize(&presented)?;

    let sources = Sources::live();
    let mut app = App::new(query_service(&config, &sources), grant, probe::hostname());
    app.refresh().await?;

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, &mut app).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        eprintln!("Error: {:?}", err);
    }

    Ok(())
}

async fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
) -> Result<()> {
    loop {
        terminal.draw(|f| ui::draw(f, app))?;

        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                match key.code {
                    KeyCode::Char('q') => return Ok(()),
                    KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                        return Ok(());
                    }
                    KeyCode::Up => app.previous_row(),
                    KeyCode::Down => app.next_row(),
                    KeyCode::PageUp => app.page_up(10),
                    KeyCode::PageDown => app.page_down(10),
                    KeyCode::Tab => app.next_tab(),
                    KeyCode::BackTab => app.previous_tab(),
                    KeyCode::Char(c @ '1'..='5') => app.set_tab_index(c as usize - '1' as usize),
                    KeyCode::Char('s') if app.current_tab == app::Tab::Processes => {
                        app.toggle_rank().await?;
                    }
                    KeyCode::Char('r') => app.refresh().await?,
                    _ => {}
                }
            }
        }

        app.update().await?;
    }
}
