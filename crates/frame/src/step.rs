/// Simulation step in seconds (60 Hz).
pub const DEFAULT_STEP: f64 = 1.0 / 60.0;

/// Longest span of wall time, in seconds, credited to a single frame.
pub const DEFAULT_CAP: f64 = 1.0;

// Absorbs rounding when the lag is an exact multiple of the step.
const EPSILON: f64 = 1e-9;

/// Outcome of one [`FixedStep::advance`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickReport {
    /// Simulation steps run this frame.
    pub updates: u32,
    /// Lag left in the accumulator, in seconds.
    pub lag: f64,
    /// Tick number passed to render.
    pub tick: u64,
}

/// Lag accumulator driving a fixed-rate update and a once-per-frame render.
#[derive(Debug, Clone)]
pub struct FixedStep {
    last: Option<f64>,
    lag: f64,
    step: f64,
    cap: f64,
    tick: u64,
}

impl Default for FixedStep {
    fn default() -> Self {
        Self::with_step(DEFAULT_STEP, DEFAULT_CAP)
    }
}

impl FixedStep {
    pub fn new() -> Self {
        Self::default()
    }

    /// Custom step and cap, both in seconds.
    pub fn with_step(step: f64, cap: f64) -> Self {
        let step = if step > 0.0 { step } else { DEFAULT_STEP };
        Self {
            last: None,
            lag: 0.0,
            step,
            cap: cap.max(step),
            tick: 0,
        }
    }

    pub fn step(&self) -> f64 {
        self.step
    }

    pub fn cap(&self) -> f64 {
        self.cap
    }

    pub fn lag(&self) -> f64 {
        self.lag
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Forget the timestamp baseline, lag and tick counter.
    pub fn reset(&mut self) {
        self.last = None;
        self.lag = 0.0;
        self.tick = 0;
    }

    /// Advance to host time `now_ms` (milliseconds).
    ///
    /// The first call only establishes the baseline. Elapsed time is capped,
    /// drained in whole steps through `update(step_seconds)`, then `render`
    /// runs once with the current tick.
    pub fn advance<U, R>(&mut self, now_ms: f64, mut update: U, mut render: R) -> TickReport
    where
        U: FnMut(f32),
        R: FnMut(u64),
    {
        let delta = match self.last {
            Some(last) => ((now_ms - last) / 1000.0).max(0.0),
            None => 0.0,
        };
        self.last = Some(now_ms);

        self.lag += delta.min(self.cap);
        if self.lag > self.cap {
            tracing::debug!(lag = self.lag, "frame lag over cap, dropping backlog");
            self.lag = 0.0;
        }

        let mut updates = 0;
        while self.lag + EPSILON >= self.step {
            update(self.step as f32);
            self.lag -= self.step;
            updates += 1;
        }
        self.lag = self.lag.max(0.0);

        let tick = self.tick;
        render(tick);
        self.tick += 1;

        tracing::trace!(updates, lag = self.lag, tick, "frame advanced");
        TickReport {
            updates,
            lag: self.lag,
            tick,
        }
    }
}
