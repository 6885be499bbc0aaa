use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use log::{LevelFilter, error, info};
use ratatui::prelude::CrosstermBackend;
use simplelog::{Config as LogConfig, WriteLogger};
use std::fs::{self, File};
use std::io;
use std::path::Path;
use std::str::FromStr;
use std::time::{Duration, Instant};

use xnettop::app::App;
use xnettop::cli;
use xnettop::config::Config;
use xnettop::stats::query::SortKey;
use xnettop::ui;

fn main() -> Result<()> {
    let matches = cli::build_cli().get_matches();

    // Set up logging only if log-level was provided
    if let Some(level) = matches.get_one::<String>("log-level") {
        let level = LevelFilter::from_str(level)
            .map_err(|_| anyhow::anyhow!("Invalid log level: {}", level))?;
        setup_logging(level)?;
    }

    info!("Starting xnettop");

    let mut config = Config::load(matches.get_one::<String>("config").map(String::as_str))?;
    if let Some(path) = &config.config_path {
        info!("Loaded configuration from {}", path.display());
    }

    if let Some(interface) = matches.get_one::<String>("interface") {
        config.interface = Some(interface.to_string());
        info!("Using interface: {}", interface);
    }

    if let Some(interval) = matches.get_one::<u64>("refresh-interval") {
        config.refresh_interval = *interval;
        info!("Using refresh interval: {}ms", interval);
    }

    if let Some(interval) = matches.get_one::<u64>("connection-refresh") {
        config.connection_refresh_interval = *interval;
        info!("Using connection refresh interval: {}ms", interval);
    }

    if let Some(window) = matches.get_one::<u64>("window") {
        config.rate_window = *window;
        info!("Using rate window: {}ms", window);
    }

    if let Some(capacity) = matches.get_one::<usize>("queue-capacity") {
        config.queue_capacity = *capacity;
    }

    if let Some(sort) = matches.get_one::<String>("sort") {
        config.sort = sort.parse::<SortKey>()?;
    }

    if let Some(filter) = matches.get_one::<String>("bpf-filter") {
        config.bpf_filter = Some(filter.to_string());
        info!("Using BPF filter: {}", filter);
    }

    // Startup failures surface here, before the terminal is taken over
    let mut app = App::new(config)?;
    app.start()?;
    info!("Application started");

    let backend = CrosstermBackend::new(io::stdout());
    let mut terminal = ui::setup_terminal(backend)?;
    info!("Terminal UI initialized");

    let res = run_ui_loop(&mut terminal, &app);

    // Cleanup
    app.stop();
    ui::restore_terminal(&mut terminal)?;

    if let Err(err) = res {
        error!("Application error: {}", err);
        eprintln!("Error: {}", err);
    }

    info!("xnettop shutting down");
    Ok(())
}

fn setup_logging(level: LevelFilter) -> Result<()> {
    let log_dir = Path::new("logs");
    if !log_dir.exists() {
        fs::create_dir_all(log_dir)?;
    }

    let timestamp = chrono::Local::now().format("%Y-%m-%d_%H-%M-%S");
    let log_file_path = log_dir.join(format!("xnettop_{}.log", timestamp));

    WriteLogger::init(level, LogConfig::default(), File::create(log_file_path)?)?;

    Ok(())
}

fn run_ui_loop<B: ratatui::prelude::Backend>(
    terminal: &mut ui::Terminal<B>,
    app: &App,
) -> Result<()> {
    let tick_rate = app.config.refresh_interval();
    let query = app.query();
    let mut ui_state = ui::UIState::new(app.config.sort);
    let mut last_tick = Instant::now();
    let mut refresh_now = true;
    let mut rows = Vec::new();
    let mut stats = app.stats();

    loop {
        if refresh_now || last_tick.elapsed() >= tick_rate {
            rows = ui_state.order(query.snapshot(ui_state.sort_key));
            stats = app.stats();
            ui_state.ensure_valid_selection(rows.len());
            ui_state.expire_status();
            last_tick = Instant::now();
            refresh_now = false;
        }

        terminal.draw(|f| ui::draw(f, app, &mut ui_state, &rows, &stats))?;

        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or(Duration::ZERO);

        if !event::poll(timeout)? {
            continue;
        }
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }

        let resort = |ui_state: &mut ui::UIState, key: SortKey| {
            ui_state.select_sort(key);
            info!(
                "Sorting by {} ({})",
                ui_state.sort_key,
                if ui_state.is_descending() { "desc" } else { "asc" }
            );
        };

        match (key.code, key.modifiers) {
            (KeyCode::Char('c'), KeyModifiers::CONTROL) => {
                info!("User requested exit with Ctrl+C");
                break;
            }
            (KeyCode::Char('q'), _) | (KeyCode::Esc, _) => {
                info!("User requested exit");
                break;
            }
            (KeyCode::Char('d'), _) => resort(&mut ui_state, SortKey::Download),
            (KeyCode::Char('u'), _) => resort(&mut ui_state, SortKey::Upload),
            (KeyCode::Char('t'), _) => resort(&mut ui_state, SortKey::Total),
            (KeyCode::Char('n'), _) => resort(&mut ui_state, SortKey::Name),
            (KeyCode::Char('c'), _) => {
                app.clear();
                ui_state.set_status("Statistics cleared");
            }
            (KeyCode::Up, _) | (KeyCode::Char('k'), _) => {
                ui_state.move_selection_up(rows.len());
                continue;
            }
            (KeyCode::Down, _) | (KeyCode::Char('j'), _) => {
                ui_state.move_selection_down(rows.len());
                continue;
            }
            _ => continue,
        }

        // Re-query right away so sort and clear show without waiting a tick
        refresh_now = true;
    }

    Ok(())
}
