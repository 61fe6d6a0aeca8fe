use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::Duration;

use crossterm::event::{KeyCode, KeyEvent};
use log::warn;

use crate::error::Result;
use crate::ledger::format_amount;
use crate::sim::{Entropy, Notice, Simulator};
use crate::store::KeyValueStore;

const MAX_MESSAGES: usize = 5;

pub struct App<S: KeyValueStore, E: Entropy> {
    pub should_quit: bool,
    pub confirm_reset: bool,
    pub sim: Simulator<S, E>,
    pub messages: VecDeque<String>,
    export_dir: PathBuf,
}

impl<S: KeyValueStore, E: Entropy> App<S, E> {
    pub fn new(sim: Simulator<S, E>, export_dir: PathBuf) -> Self {
        Self {
            should_quit: false,
            confirm_reset: false,
            sim,
            messages: VecDeque::new(),
            export_dir,
        }
    }

    pub fn on_tick(&mut self, dt: Duration) {
        for notice in self.sim.advance(dt) {
            self.push_notice(&notice);
        }
    }

    pub fn on_price(&mut self, quote: Result<f64>) {
        let Ok(price) = quote else {
            self.push_message("Price lookup failed, using fallback");
            return;
        };
        if self.sim.apply_price(price) {
            self.push_message(format!("Live BTC price: ${:.2}", price));
        } else {
            self.push_message("Price quote rejected, using fallback");
        }
    }

    fn push_notice(&mut self, notice: &Notice) {
        let message = match notice {
            Notice::Started => "Mining started".to_string(),
            Notice::Stopped => "Mining stopped".to_string(),
            Notice::BlockMined(amount) => format!("Block mined! {}", format_amount(*amount)),
            Notice::Guaranteed(amount) => format!("Guaranteed reward {}", format_amount(*amount)),
        };
        self.push_message(message);
    }

    pub fn push_message(&mut self, msg: impl Into<String>) {
        self.messages.push_front(msg.into());
        while self.messages.len() > MAX_MESSAGES {
            self.messages.pop_back();
        }
    }

    pub fn on_key(&mut self, key: KeyEvent) {
        if self.confirm_reset {
            self.confirm_reset = false;
            if matches!(key.code, KeyCode::Char('y' | 'Y')) {
                self.reset();
            } else {
                self.push_message("Reset cancelled");
            }
            return;
        }

        match key.code {
            KeyCode::Char('q' | 'Q') | KeyCode::Esc => self.quit(),
            KeyCode::Char(' ' | 'm' | 'M') | KeyCode::Enter => {
                let notice = self.sim.toggle_mining();
                self.push_notice(&notice);
            }
            KeyCode::Char('e' | 'E') => self.export(),
            KeyCode::Char('r' | 'R') => {
                self.confirm_reset = true;
                self.push_message("Reset all data? Press Y to confirm");
            }
            _ => {}
        }
    }

    fn quit(&mut self) {
        self.sim.shutdown();
        self.should_quit = true;
    }

    fn export(&mut self) {
        match self.sim.export(&self.export_dir) {
            Ok(path) => self.push_message(format!("Exported to {}", path.display())),
            Err(err) => {
                warn!("export failed: {err}");
                self.push_message("Export failed, see log");
            }
        }
    }

    fn reset(&mut self) {
        match self.sim.reset() {
            Ok(()) => self.push_message("Data reset to defaults"),
            Err(err) => {
                warn!("reset failed: {err}");
                self.push_message("Reset failed, see log");
            }
        }
    }
}
