//! pixelflow - AI photo-processing jobs from your terminal
//!
//! Without a subcommand, opens a live dashboard of the user's jobs. The
//! subcommands fetch, watch or download jobs and print plain text or JSON.

use std::io::{self, Write};
use std::panic;
use std::process;
use std::time::Duration;

use clap::Parser;
use crossterm::{
    event::{self, Event},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use tracing::{debug, info};

use pixelflow::app::App;
use pixelflow::cli::{Cli, Command};
use pixelflow::commands::{self, Context};
use pixelflow::config::Settings;
use pixelflow::logging::{self, LogTarget};
use pixelflow::refresh::{self, RefreshConfig, RefreshHandle, RefreshMessage};
use pixelflow::ui;

/// Ledger keys untouched for this many refresh intervals are swept
const SWEEP_INTERVALS: u32 = 10;

/// Sets up a panic hook that restores the terminal before printing the panic message.
/// This ensures the terminal is usable even if the application panics.
fn setup_panic_hook() {
    let original_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        // Attempt to restore the terminal
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
        // Call the original panic hook
        original_hook(panic_info);
    }));
}

/// Runs the dashboard until the user quits
async fn run_dashboard(settings: Settings) -> Result<(), Box<dyn std::error::Error>> {
    let refresh_interval = settings.refresh_interval();
    let context = Context::new(settings)?;

    setup_panic_hook();

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(context);
    app.load_all_data(false);

    let mut refresh_handle = RefreshHandle::spawn(RefreshConfig {
        interval: refresh_interval,
        enabled: true,
    });

    // Main event loop
    let result = loop {
        if let Err(e) = terminal.draw(|f| ui::render(f, &app)) {
            break Err(e);
        }

        // Poll for keyboard events with 100ms timeout
        match event::poll(Duration::from_millis(100)) {
            Ok(true) => match event::read() {
                Ok(Event::Key(key)) => app.handle_key(key),
                Ok(_) => {}
                Err(e) => break Err(e),
            },
            Ok(false) => {}
            Err(e) => break Err(e),
        }

        while let Some(RefreshMessage::RefreshDue) = refresh::try_recv(&mut refresh_handle) {
            debug!("auto-refresh tick");
            app.on_refresh_tick(refresh_interval * SWEEP_INTERVALS);
        }

        app.dispatch_pending();

        if app.should_quit {
            break Ok(());
        }
    };

    refresh_handle.shutdown().await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;

    result.map_err(Into::into)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let command = cli.command();

    let target = match command {
        Command::Dashboard => logging::default_log_path()
            .map(LogTarget::File)
            .unwrap_or(LogTarget::Stderr),
        _ => LogTarget::Stderr,
    };
    logging::init(&target, cli.verbose)?;

    let settings = match cli.resolve_settings() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(2);
        }
    };
    info!(api_url = %settings.api_url, locale = settings.locale.code(), "starting");

    if let Command::Dashboard = command {
        return run_dashboard(settings).await;
    }

    let context = Context::new(settings)?;
    let mut stdout = io::stdout().lock();
    if let Err(e) = commands::run(command, &context, &mut stdout).await {
        let _ = stdout.flush();
        eprintln!("Error: {}", e);
        process::exit(1);
    }
    Ok(())
}
