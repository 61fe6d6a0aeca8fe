use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    HashRate,
    Reward,
    Countdown,
    Fluctuation,
}

impl TimerKind {
    #[cfg(test)]
    pub const MINING: [TimerKind; 3] = [
        TimerKind::HashRate,
        TimerKind::Reward,
        TimerKind::Countdown,
    ];

    pub fn period(self) -> Duration {
        match self {
            TimerKind::HashRate => Duration::from_secs(2),
            TimerKind::Reward | TimerKind::Countdown => Duration::from_secs(1),
            TimerKind::Fluctuation => Duration::from_secs(5),
        }
    }
}

/// Shared flag handed to every timer armed by one mining session. Stopping
/// the session cancels it, so a firing that was already collected is still
/// recognised as stale by its callback.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Rc<Cell<bool>>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.set(true);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.get()
    }
}

#[derive(Debug)]
pub struct PeriodicTimer {
    pub kind: TimerKind,
    period: Duration,
    elapsed: Duration,
    token: CancelToken,
}

impl PeriodicTimer {
    fn new(kind: TimerKind, token: CancelToken) -> Self {
        Self {
            kind,
            period: kind.period(),
            elapsed: Duration::ZERO,
            token,
        }
    }

    /// Advances by `dt` and returns the offsets into `dt` at which the timer fired.
    fn advance(&mut self, dt: Duration) -> Vec<Duration> {
        let mut offsets = Vec::new();
        let mut next = self.period - self.elapsed;
        while next <= dt {
            offsets.push(next);
            next += self.period;
        }
        let total = (self.elapsed + dt).as_nanos() % self.period.as_nanos();
        self.elapsed = Duration::from_nanos(total as u64);
        offsets
    }
}

#[derive(Debug, Clone)]
pub struct Firing {
    pub kind: TimerKind,
    pub token: CancelToken,
}

/// Virtual-time scheduler. Holds at most one timer of each mining kind, plus
/// the fluctuation timer which stays armed for the whole process lifetime.
#[derive(Debug)]
pub struct TimerSet {
    hash_rate: Option<PeriodicTimer>,
    reward: Option<PeriodicTimer>,
    countdown: Option<PeriodicTimer>,
    fluctuation: PeriodicTimer,
    token: Option<CancelToken>,
}

impl Default for TimerSet {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerSet {
    pub fn new() -> Self {
        Self {
            hash_rate: None,
            reward: None,
            countdown: None,
            fluctuation: PeriodicTimer::new(TimerKind::Fluctuation, CancelToken::new()),
            token: None,
        }
    }

    /// Arms the three mining timers under a fresh token, replacing any that
    /// are still armed.
    pub fn start(&mut self) -> CancelToken {
        self.stop();
        let token = CancelToken::new();
        self.hash_rate = Some(PeriodicTimer::new(TimerKind::HashRate, token.clone()));
        self.reward = Some(PeriodicTimer::new(TimerKind::Reward, token.clone()));
        self.countdown = Some(PeriodicTimer::new(TimerKind::Countdown, token.clone()));
        self.token = Some(token.clone());
        token
    }

    /// Cancels and drops the mining timers. Calling it while stopped is a no-op.
    pub fn stop(&mut self) {
        if let Some(token) = self.token.take() {
            token.cancel();
        }
        self.hash_rate = None;
        self.reward = None;
        self.countdown = None;
    }

    #[cfg(test)]
    pub fn active_count(&self, kind: TimerKind) -> usize {
        let slot = match kind {
            TimerKind::HashRate => &self.hash_rate,
            TimerKind::Reward => &self.reward,
            TimerKind::Countdown => &self.countdown,
            TimerKind::Fluctuation => return 1,
        };
        usize::from(slot.is_some())
    }

    /// Advances every armed timer by `dt` and returns the firings in
    /// wall-clock order. Ties keep declaration order.
    pub fn advance(&mut self, dt: Duration) -> Vec<Firing> {
        let mut due: Vec<(Duration, usize, Firing)> = Vec::new();
        let timers = [
            self.hash_rate.as_mut(),
            self.reward.as_mut(),
            self.countdown.as_mut(),
            Some(&mut self.fluctuation),
        ];
        for (order, timer) in timers.into_iter().enumerate() {
            let Some(timer) = timer else { continue };
            for offset in timer.advance(dt) {
                let firing = Firing {
                    kind: timer.kind,
                    token: timer.token.clone(),
                };
                due.push((offset, order, firing));
            }
        }
        due.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));
        due.into_iter().map(|(_, _, firing)| firing).collect()
    }
}

/// Whole-second countdown to the guaranteed reward. `remaining` stays in
/// `[0, period)`; the reward is due on the tick after it reaches zero.
#[derive(Debug, Clone)]
pub struct Countdown {
    period: u32,
    remaining: u32,
}

impl Countdown {
    pub fn new(period: u32) -> Self {
        let period = period.max(1);
        Self {
            period,
            remaining: period - 1,
        }
    }

    pub fn reset(&mut self) {
        self.remaining = self.period - 1;
    }

    /// One second elapsed. Returns true when the period completed.
    pub fn tick(&mut self) -> bool {
        if self.remaining == 0 {
            self.reset();
            true
        } else {
            self.remaining -= 1;
            false
        }
    }

    pub fn period(&self) -> u32 {
        self.period
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn progress(&self) -> f64 {
        f64::from(self.period - 1 - self.remaining) / f64::from(self.period)
    }
}

pub fn format_countdown(seconds: u32) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, secs)
}
