mod app;
mod config;
mod error;
mod ledger;
mod price;
mod sim;
mod store;
mod timer;
mod ui;

use std::fs::{self, OpenOptions};
use std::io::{self, Stdout, Write};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use app::App;
use config::Config;
use crossterm::event::{self, Event as CEvent, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use log::{info, warn};
use rand::SeedableRng;
use rand::rngs::StdRng;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use sim::Simulator;
use store::DataStore;

use crate::ui::draw;

enum Event<I> {
    Input(I),
    Tick,
    Price(error::Result<f64>),
}

fn main() -> Result<()> {
    let config = Config::from_env();
    let log_error = init_logging(&config).err();
    if let Some(err) = &log_error {
        eprintln!("logging disabled: {err:#}");
    }
    for (key, raw) in &config.rejected {
        warn!("ignoring invalid {key}={raw:?}, using default");
    }

    let store = DataStore::open_or_memory(&config.data_dir);
    let persistent = store.is_persistent();
    let sim = Simulator::load(store, StdRng::from_entropy(), config.reward_period);
    let mut app = App::new(sim, config.data_dir.clone());
    if !persistent {
        app.push_message("Data dir unusable, progress will not be saved");
    }
    if log_error.is_some() {
        app.push_message("Log file unavailable, logging disabled");
    }

    let mut terminal = setup_terminal()?;
    let res = run_app(&mut terminal, &mut app, &config);
    restore_terminal(&mut terminal)?;
    info!("exiting");
    res
}

/// Sends log records to the configured file. When the file cannot be opened
/// the logger is still installed, writing nowhere, and the error is returned.
fn init_logging(config: &Config) -> Result<()> {
    let opened = config
        .log_file
        .parent()
        .map_or(Ok(()), fs::create_dir_all)
        .and_then(|()| {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(&config.log_file)
        })
        .with_context(|| format!("opening log file {}", config.log_file.display()));
    let (target, result): (Box<dyn Write + Send>, Result<()>) = match opened {
        Ok(file) => (Box::new(file), Ok(())),
        Err(err) => (Box::new(io::sink()), Err(err)),
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Pipe(target))
        .init();
    result
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let terminal = Terminal::new(backend)?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

fn run_app(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    app: &mut App<DataStore, StdRng>,
    config: &Config,
) -> Result<()> {
    let (tx, rx) = mpsc::channel();
    let tick_rate = Duration::from_millis(200);

    if config.fetch_price {
        price::spawn_fetch(config.price_url.clone(), tx.clone(), Event::Price);
    } else {
        info!("price lookup disabled, using fallback");
    }

    let input_tx = tx.clone();
    thread::spawn(move || {
        loop {
            if !event::poll(Duration::from_millis(250)).unwrap_or(false) {
                continue;
            }
            match event::read() {
                Ok(CEvent::Key(key)) if key.kind == KeyEventKind::Press => {
                    if input_tx.send(Event::Input(key)).is_err() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(_) => {}
            }
        }
    });

    thread::spawn(move || {
        loop {
            if tx.send(Event::Tick).is_err() {
                break;
            }
            thread::sleep(tick_rate);
        }
    });

    let mut last_tick = Instant::now();
    loop {
        terminal.draw(|f| draw(f, app))?;

        match rx.recv()? {
            Event::Input(key) => {
                app.on_key(key);
            }
            Event::Tick => {
                let now = Instant::now();
                app.on_tick(now - last_tick);
                last_tick = now;
            }
            Event::Price(quote) => {
                app.on_price(quote);
            }
        }

        if app.should_quit {
            break;
        }
    }

    Ok(())
}
