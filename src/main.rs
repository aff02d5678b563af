use clap::Parser;
use crossterm::{
    event::{DisableMouseCapture, EnableMouseCapture},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::prelude::*;
use std::{io, sync::Arc};
use tracing::info;

mod app;

use app::api::HttpTodoClient;
use app::config::{Cli, Config};
use app::sync::TodoSync;

// Start the app.
// Configuration and logging are set up before the terminal switches to raw
// mode, so their errors print normally.
#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_cli(Cli::parse())?;
    app::logging::init_logging(&config.log_file)?;
    info!(base_url = %config.base_url, user = %config.user, "starting todo client");

    let client = HttpTodoClient::new(config.base_url.clone(), config.request_timeout)?;
    let (sync, sync_events) = TodoSync::new(Arc::new(client), config.user, config.completed);

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let app = app::ui::App::new(sync);
    let res = app::ui::run_app(&mut terminal, app, sync_events, config.tick_rate).await;

    // Restore previous terminal state after exit
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        println!("{err:?}");
    }
    info!("todo client stopped");

    Ok(())
}
