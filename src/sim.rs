use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::Rng;

use crate::error::Result;
use crate::ledger::{Ledger, Transaction, TxKind};
use crate::store::{self, ExportDocument, KeyValueStore};
use crate::timer::{Countdown, Firing, TimerKind, TimerSet};

pub const FALLBACK_BTC_PRICE: f64 = 45_000.0;
pub const DEFAULT_REWARD_PERIOD: u32 = 30;

const REWARD_CHANCE: f64 = 0.01;
const BASE_REWARD: f64 = 0.000_000_50;
const REWARD_VARIANCE: f64 = 0.000_000_25;
const GUARANTEED_REWARD: f64 = 0.000_001_00;
const FLUCTUATION_SPAN: f64 = 0.000_000_01;
const MIN_HASH_RATE: u32 = 50;
const HASH_RATE_SPAN: u32 = 100;
const DAILY_BTC_PER_HASH: f64 = 0.000_000_01;

/// Uniform samples in `[0, 1)`.
pub trait Entropy {
    fn next_unit(&mut self) -> f64;
}

impl Entropy for StdRng {
    fn next_unit(&mut self) -> f64 {
        self.r#gen::<f64>()
    }
}

/// Returns the same sample forever. Makes every draw reproducible.
#[cfg(test)]
#[derive(Debug, Clone, Copy)]
pub struct FixedEntropy(pub f64);

#[cfg(test)]
impl Entropy for FixedEntropy {
    fn next_unit(&mut self) -> f64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MiningStatus {
    Idle,
    Mining,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PriceSource {
    Fallback,
    Live,
}

/// Something the dashboard should surface in its feed.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    Started,
    Stopped,
    BlockMined(f64),
    Guaranteed(f64),
}

pub struct Simulator<S: KeyValueStore, E: Entropy> {
    status: MiningStatus,
    balance: f64,
    ledger: Ledger,
    hash_rate: u32,
    active_miners: u8,
    price: f64,
    price_source: PriceSource,
    countdown: Countdown,
    timers: TimerSet,
    store: S,
    entropy: E,
}

impl<S: KeyValueStore, E: Entropy> Simulator<S, E> {
    /// Restores balance and ledger from `store`; session state starts fresh.
    pub fn load(store: S, entropy: E, reward_period: u32) -> Self {
        let (balance, ledger) = store::load_state(&store);
        info!(
            "loaded balance {:.8} BTC with {} ledger entries",
            balance,
            ledger.len()
        );
        Self {
            status: MiningStatus::Idle,
            balance,
            ledger,
            hash_rate: 0,
            active_miners: 0,
            price: FALLBACK_BTC_PRICE,
            price_source: PriceSource::Fallback,
            countdown: Countdown::new(reward_period),
            timers: TimerSet::new(),
            store,
            entropy,
        }
    }

    pub fn toggle_mining(&mut self) -> Notice {
        match self.status {
            MiningStatus::Idle => {
                self.start_mining();
                Notice::Started
            }
            MiningStatus::Mining => {
                self.stop_mining();
                Notice::Stopped
            }
        }
    }

    fn start_mining(&mut self) {
        self.status = MiningStatus::Mining;
        self.active_miners = 1;
        self.hash_rate = self.draw_hash_rate();
        self.countdown.reset();
        self.timers.start();
        info!("mining started at {} H/s", self.hash_rate);
        self.record("Mining Started", 0.0, TxKind::Info);
    }

    fn stop_mining(&mut self) {
        self.status = MiningStatus::Idle;
        self.timers.stop();
        self.active_miners = 0;
        self.hash_rate = 0;
        info!("mining stopped");
        self.record("Mining Stopped", 0.0, TxKind::Info);
    }

    /// Moves virtual time forward and runs every callback that fell due.
    pub fn advance(&mut self, dt: Duration) -> Vec<Notice> {
        let mut notices = Vec::new();
        for firing in self.timers.advance(dt) {
            if let Some(notice) = self.on_timer(&firing) {
                notices.push(notice);
            }
        }
        notices
    }

    fn on_timer(&mut self, firing: &Firing) -> Option<Notice> {
        if firing.token.is_cancelled() || self.status != MiningStatus::Mining {
            return None;
        }
        match firing.kind {
            TimerKind::HashRate => {
                self.hash_rate = self.draw_hash_rate();
                None
            }
            TimerKind::Reward => self.roll_reward(),
            TimerKind::Countdown => {
                if self.countdown.tick() {
                    self.credit("Guaranteed Reward", GUARANTEED_REWARD, TxKind::Guaranteed)
                        .then_some(Notice::Guaranteed(GUARANTEED_REWARD))
                } else {
                    None
                }
            }
            TimerKind::Fluctuation => {
                self.fluctuate();
                None
            }
        }
    }

    fn draw_hash_rate(&mut self) -> u32 {
        let span = (self.entropy.next_unit() * f64::from(HASH_RATE_SPAN)) as u32;
        MIN_HASH_RATE + span.min(HASH_RATE_SPAN - 1)
    }

    fn roll_reward(&mut self) -> Option<Notice> {
        if self.entropy.next_unit() >= REWARD_CHANCE {
            return None;
        }
        let amount = BASE_REWARD + self.entropy.next_unit() * REWARD_VARIANCE;
        debug!("block found worth {:.8} BTC", amount);
        self.credit("Block Mined", amount, TxKind::Reward)
            .then_some(Notice::BlockMined(amount))
    }

    fn fluctuate(&mut self) {
        let delta = (self.entropy.next_unit() - 0.5) * FLUCTUATION_SPAN;
        self.balance = (self.balance + delta).max(0.0);
        if let Err(err) = store::save_balance(&mut self.store, self.balance) {
            warn!("failed to persist balance: {err}");
        }
    }

    /// Applies `amount` to the balance and records it. Returns false when
    /// the amount was refused.
    fn credit(&mut self, description: &str, amount: f64, kind: TxKind) -> bool {
        let tx = match Transaction::new(description, amount, kind) {
            Ok(tx) => tx,
            Err(err) => {
                warn!("dropping `{description}`: {err}");
                return false;
            }
        };
        self.balance += amount;
        self.ledger.push(tx);
        self.persist();
        true
    }

    fn record(&mut self, description: &str, amount: f64, kind: TxKind) {
        match Transaction::new(description, amount, kind) {
            Ok(tx) => {
                self.ledger.push(tx);
                self.persist();
            }
            Err(err) => warn!("dropping `{description}`: {err}"),
        }
    }

    fn persist(&mut self) {
        if let Err(err) = store::save_balance(&mut self.store, self.balance) {
            warn!("failed to persist balance: {err}");
        }
        if let Err(err) = store::save_ledger(&mut self.store, &self.ledger) {
            warn!("failed to persist ledger: {err}");
        }
    }

    /// Process is going away. A running session is closed out in the ledger
    /// and written through one last time.
    pub fn shutdown(&mut self) {
        if self.status != MiningStatus::Mining {
            return;
        }
        self.timers.stop();
        self.status = MiningStatus::Idle;
        self.active_miners = 0;
        self.hash_rate = 0;
        self.record("Mining Session Ended", 0.0, TxKind::Info);
        info!("session closed while mining");
    }

    /// Drops persisted state and reseeds the defaults. Mining keeps its
    /// current status. If the store only partly cleared, the seed state is
    /// written back so memory and storage agree.
    pub fn reset(&mut self) -> Result<()> {
        let cleared = store::clear(&mut self.store);
        self.balance = store::STARTING_BALANCE;
        self.ledger = store::seed_ledger();
        self.countdown.reset();
        if let Err(err) = cleared {
            warn!("reset could not clear storage: {err}; rewriting defaults");
            self.persist();
            return Err(err);
        }
        info!("state reset to defaults");
        Ok(())
    }

    pub fn export(&self, dir: &Path) -> Result<PathBuf> {
        let path = ExportDocument::new(self.balance, &self.ledger).write_to(dir)?;
        info!("exported ledger to {}", path.display());
        Ok(path)
    }

    /// Adopts a quoted BTC/USD price. Non-positive quotes are ignored.
    pub fn apply_price(&mut self, price: f64) -> bool {
        if !price.is_finite() || price <= 0.0 {
            warn!("ignoring unusable price {price}");
            return false;
        }
        self.price = price;
        self.price_source = PriceSource::Live;
        info!("adopted live BTC price {:.2} USD", price);
        true
    }

    pub fn status(&self) -> MiningStatus {
        self.status
    }

    pub fn is_mining(&self) -> bool {
        self.status == MiningStatus::Mining
    }

    pub fn balance(&self) -> f64 {
        self.balance
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn hash_rate(&self) -> u32 {
        self.hash_rate
    }

    pub fn active_miners(&self) -> u8 {
        self.active_miners
    }

    pub fn price(&self) -> f64 {
        self.price
    }

    pub fn price_source(&self) -> PriceSource {
        self.price_source
    }

    pub fn usd_value(&self) -> f64 {
        self.balance * self.price
    }

    pub fn daily_estimate(&self) -> f64 {
        f64::from(self.hash_rate) * DAILY_BTC_PER_HASH
    }

    pub fn countdown(&self) -> &Countdown {
        &self.countdown
    }

    /// Fraction of the guaranteed-reward period elapsed; zero while idle.
    pub fn progress(&self) -> f64 {
        if self.is_mining() {
            self.countdown.progress()
        } else {
            0.0
        }
    }

    #[cfg(test)]
    pub fn timers(&self) -> &TimerSet {
        &self.timers
    }

    #[cfg(test)]
    pub fn store(&self) -> &S {
        &self.store
    }

    #[cfg(test)]
    pub fn into_store(self) -> S {
        self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::MAX_RETAINED;
    use crate::store::{BALANCE_KEY, MemoryStore, STARTING_BALANCE, TRANSACTIONS_KEY};
    use rand::SeedableRng;

    const SECOND: Duration = Duration::from_secs(1);

    fn fixed(value: f64) -> Simulator<MemoryStore, FixedEntropy> {
        Simulator::load(MemoryStore::new(), FixedEntropy(value), DEFAULT_REWARD_PERIOD)
    }

    /// Store whose writes can be made to fail, wholesale or for one key.
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryStore,
        fail_all: bool,
        fail_remove: Option<&'static str>,
    }

    impl FlakyStore {
        fn refuse(key: &str) -> crate::error::SimError {
            crate::error::SimError::PersistenceWrite {
                key: key.to_string(),
                source: std::io::Error::other("disk unavailable"),
            }
        }
    }

    impl KeyValueStore for FlakyStore {
        fn get(&self, key: &str) -> Result<Option<String>> {
            if self.fail_all {
                return Err(crate::error::SimError::PersistenceRead {
                    key: key.to_string(),
                    reason: "disk unavailable".to_string(),
                });
            }
            self.inner.get(key)
        }

        fn set(&mut self, key: &str, value: &str) -> Result<()> {
            if self.fail_all {
                return Err(Self::refuse(key));
            }
            self.inner.set(key, value)
        }

        fn remove(&mut self, key: &str) -> Result<()> {
            if self.fail_all || self.fail_remove == Some(key) {
                return Err(Self::refuse(key));
            }
            self.inner.remove(key)
        }
    }

    fn persisted_balance(store: &MemoryStore) -> f64 {
        store.get(BALANCE_KEY).unwrap().unwrap().parse().unwrap()
    }

    #[test]
    fn fresh_store_scenario() {
        let mut sim = fixed(0.005);
        assert_eq!(sim.balance(), STARTING_BALANCE);
        assert_eq!(sim.ledger().len(), 1);
        assert_eq!(sim.ledger().latest().unwrap().description, "Welcome Bonus");

        assert_eq!(sim.toggle_mining(), Notice::Started);
        assert_eq!(sim.ledger().len(), 2);
        let started = sim.ledger().latest().unwrap();
        assert_eq!(started.description, "Mining Started");
        assert_eq!(started.amount, 0.0);

        let mut rewards = 0;
        for _ in 0..100 {
            for notice in sim.advance(SECOND) {
                if matches!(notice, Notice::BlockMined(_)) {
                    rewards += 1;
                }
            }
            assert!(sim.ledger().len() <= MAX_RETAINED);
            assert!(sim.ledger().visible().len() <= 10);
        }
        assert_eq!(rewards, 100);
        assert_eq!(sim.ledger().len(), MAX_RETAINED);
        assert!(sim.ledger().entries().iter().all(|tx| tx.kind != TxKind::Bonus));

        assert_eq!(sim.toggle_mining(), Notice::Stopped);
        assert_eq!(sim.ledger().latest().unwrap().description, "Mining Stopped");
        for kind in TimerKind::MINING {
            assert_eq!(sim.timers().active_count(kind), 0);
        }

        let balance = sim.balance();
        let newest = sim.ledger().latest().unwrap().id.clone();
        for _ in 0..30 {
            assert!(sim.advance(SECOND).is_empty());
        }
        assert_eq!(sim.balance(), balance);
        assert_eq!(sim.ledger().latest().unwrap().id, newest);
    }

    #[test]
    fn reward_amounts_stay_within_bounds() {
        for sample in [0.0, 0.003, 0.0099] {
            let mut sim = fixed(sample);
            sim.toggle_mining();
            sim.advance(SECOND);
            let tx = sim.ledger().latest().unwrap();
            assert_eq!(tx.kind, TxKind::Reward);
            assert!(tx.amount >= 0.000_000_50 && tx.amount <= 0.000_000_75);
        }
    }

    #[test]
    fn no_reward_above_threshold() {
        let mut sim = fixed(0.5);
        sim.toggle_mining();
        for _ in 0..29 {
            sim.advance(SECOND);
        }
        assert_eq!(sim.ledger().len(), 2);
    }

    #[test]
    fn guaranteed_reward_once_per_period() {
        let mut sim = fixed(0.5);
        sim.toggle_mining();
        let mut fired_at = Vec::new();
        for second in 1..=95 {
            for notice in sim.advance(SECOND) {
                if notice == Notice::Guaranteed(GUARANTEED_REWARD) {
                    fired_at.push(second);
                }
            }
            assert!(sim.countdown().remaining() < DEFAULT_REWARD_PERIOD);
        }
        assert_eq!(fired_at, vec![30, 60, 90]);
        let guaranteed = sim
            .ledger()
            .entries()
            .iter()
            .filter(|tx| tx.kind == TxKind::Guaranteed)
            .count();
        assert_eq!(guaranteed, 3);
    }

    #[test]
    fn countdown_does_not_fire_after_stop() {
        let mut sim = fixed(0.5);
        sim.toggle_mining();
        for _ in 0..29 {
            sim.advance(SECOND);
        }
        sim.toggle_mining();
        let len = sim.ledger().len();
        sim.advance(Duration::from_secs(60));
        assert_eq!(sim.ledger().len(), len);
    }

    #[test]
    fn stale_firing_is_skipped() {
        let mut sim = fixed(0.005);
        sim.toggle_mining();
        let firings = sim.timers.advance(SECOND);
        sim.toggle_mining();
        sim.toggle_mining();
        let len = sim.ledger().len();
        for firing in &firings {
            assert_eq!(sim.on_timer(firing), None);
        }
        assert_eq!(sim.ledger().len(), len);
    }

    #[test]
    fn repeated_toggles_keep_single_timers() {
        let mut sim = fixed(0.5);
        for _ in 0..10 {
            sim.toggle_mining();
            sim.advance(Duration::from_millis(700));
            sim.toggle_mining();
        }
        sim.toggle_mining();
        for kind in TimerKind::MINING {
            assert_eq!(sim.timers().active_count(kind), 1);
        }
    }

    #[test]
    fn hash_rate_is_drawn_in_range() {
        for sample in [0.0, 0.42, 0.999_999] {
            let mut sim = fixed(sample);
            sim.toggle_mining();
            sim.advance(Duration::from_secs(2));
            assert!((50..150).contains(&sim.hash_rate()));
            assert_eq!(sim.active_miners(), 1);
        }
        let mut sim = Simulator::load(MemoryStore::new(), StdRng::seed_from_u64(7), 30);
        sim.toggle_mining();
        for _ in 0..50 {
            sim.advance(Duration::from_secs(2));
            assert!((50..150).contains(&sim.hash_rate()));
        }
        sim.toggle_mining();
        assert_eq!(sim.hash_rate(), 0);
        assert_eq!(sim.active_miners(), 0);
    }

    #[test]
    fn fluctuation_moves_balance_without_a_transaction() {
        let mut sim = fixed(0.9);
        sim.toggle_mining();
        let before = sim.balance();
        let len = sim.ledger().len();
        sim.advance(Duration::from_secs(5));
        let delta = sim.balance() - before;
        assert!(delta > 0.0 && delta <= 0.5 * FLUCTUATION_SPAN);
        assert_eq!(sim.ledger().len(), len);
        assert_eq!(persisted_balance(sim.store()), sim.balance());
    }

    #[test]
    fn fluctuation_is_idle_when_not_mining() {
        let mut sim = fixed(0.9);
        sim.advance(Duration::from_secs(20));
        assert_eq!(sim.balance(), STARTING_BALANCE);
    }

    #[test]
    fn persisted_balance_tracks_memory_and_reloads() {
        let mut sim = fixed(0.005);
        sim.toggle_mining();
        for _ in 0..12 {
            sim.advance(SECOND);
            assert_eq!(persisted_balance(sim.store()), sim.balance());
        }
        let balance = sim.balance();
        let ledger = sim.ledger().clone();
        let reloaded = Simulator::load(sim.into_store(), FixedEntropy(0.5), 30);
        assert_eq!(reloaded.balance(), balance);
        assert_eq!(reloaded.ledger().len(), ledger.len());
        assert_eq!(reloaded.ledger().latest().unwrap().id, ledger.latest().unwrap().id);
        assert!(!reloaded.is_mining());
    }

    #[test]
    fn reset_restores_seed_state() {
        let mut sim = fixed(0.005);
        sim.toggle_mining();
        sim.advance(Duration::from_secs(10));
        sim.reset().unwrap();
        assert_eq!(sim.balance(), STARTING_BALANCE);
        assert_eq!(sim.ledger().len(), 1);
        assert_eq!(sim.ledger().latest().unwrap().description, "Welcome Bonus");
        assert_eq!(sim.store().get(BALANCE_KEY).unwrap(), None);
        assert_eq!(sim.store().get(TRANSACTIONS_KEY).unwrap(), None);
    }

    #[test]
    fn shutdown_closes_running_session() {
        let mut sim = fixed(0.5);
        sim.shutdown();
        assert_eq!(sim.ledger().len(), 1);

        sim.toggle_mining();
        sim.shutdown();
        assert!(!sim.is_mining());
        assert_eq!(sim.ledger().latest().unwrap().description, "Mining Session Ended");
        let stored = sim.store().get(TRANSACTIONS_KEY).unwrap().unwrap();
        assert!(stored.contains("Mining Session Ended"));
    }

    #[test]
    fn price_updates_usd_value() {
        let mut sim = fixed(0.5);
        assert_eq!(sim.price_source(), PriceSource::Fallback);
        assert_eq!(sim.usd_value(), STARTING_BALANCE * FALLBACK_BTC_PRICE);
        assert!(!sim.apply_price(-1.0));
        assert!(!sim.apply_price(f64::NAN));
        assert_eq!(sim.price(), FALLBACK_BTC_PRICE);
        assert!(sim.apply_price(60_000.0));
        assert_eq!(sim.price_source(), PriceSource::Live);
        assert_eq!(sim.usd_value(), STARTING_BALANCE * 60_000.0);
    }

    #[test]
    fn invalid_amount_leaves_ledger_unchanged() {
        let mut sim = fixed(0.5);
        assert!(!sim.credit("Broken", f64::INFINITY, TxKind::Reward));
        assert_eq!(sim.ledger().len(), 1);
        assert_eq!(sim.balance(), STARTING_BALANCE);
    }

    #[test]
    fn daily_estimate_follows_hash_rate() {
        let mut sim = fixed(0.0);
        assert_eq!(sim.daily_estimate(), 0.0);
        sim.toggle_mining();
        assert!((sim.daily_estimate() - 50.0 * DAILY_BTC_PER_HASH).abs() < 1e-18);
    }

    #[test]
    fn broken_store_does_not_stop_the_session() {
        let store = FlakyStore {
            fail_all: true,
            ..FlakyStore::default()
        };
        let mut sim = Simulator::load(store, FixedEntropy(0.005), DEFAULT_REWARD_PERIOD);
        assert_eq!(sim.balance(), STARTING_BALANCE);
        assert_eq!(sim.ledger().len(), 1);

        sim.toggle_mining();
        sim.advance(Duration::from_secs(3));
        assert_eq!(sim.ledger().len(), 5);
        assert!(sim.balance() > STARTING_BALANCE);
        assert!(sim.reset().is_err());
        assert_eq!(sim.balance(), STARTING_BALANCE);
        sim.shutdown();
        assert!(!sim.is_mining());
    }

    #[test]
    fn partial_reset_rewrites_seed_state() {
        let mut sim = Simulator::load(FlakyStore::default(), FixedEntropy(0.005), 30);
        sim.toggle_mining();
        sim.advance(Duration::from_secs(4));
        sim.store.fail_remove = Some(TRANSACTIONS_KEY);

        assert!(sim.reset().is_err());
        assert_eq!(sim.balance(), STARTING_BALANCE);
        assert_eq!(sim.ledger().len(), 1);
        let stored: f64 = sim.store().get(BALANCE_KEY).unwrap().unwrap().parse().unwrap();
        assert_eq!(stored, STARTING_BALANCE);
        let ledger = sim.store().get(TRANSACTIONS_KEY).unwrap().unwrap();
        assert!(ledger.contains("Welcome Bonus"));
        assert!(!ledger.contains("Block Mined"));
    }

    #[test]
    fn progress_is_zero_while_idle() {
        let mut sim = fixed(0.5);
        assert_eq!(sim.progress(), 0.0);
        sim.toggle_mining();
        sim.advance(Duration::from_secs(15));
        assert!((sim.progress() - 15.0 / 30.0).abs() < 1e-12);
        sim.toggle_mining();
        assert_eq!(sim.progress(), 0.0);
    }
}
