//! Accumulating wall-clock timers for the phases of a run.

use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct Timer {
    name: String,
    total: Duration,
    started: Option<Instant>,
}

impl Timer {
    pub fn new(name: &str) -> Self {
        Timer { name: name.to_string(), total: Duration::ZERO, started: None }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn start(&mut self) {
        self.started = Some(Instant::now());
    }

    /// Add the time since the last `start`. Stopping a stopped timer is a no-op.
    pub fn stop(&mut self) {
        if let Some(t) = self.started.take() {
            self.total += t.elapsed();
        }
    }

    /// Accumulated time in seconds
    pub fn total(&self) -> f64 {
        self.total.as_secs_f64()
    }
}

/// Phase of a selector run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Evaluation,
    Variation,
    Selection,
    Persistence,
    Statistics,
}

impl Phase {
    const ALL: [Phase; 5] = [
        Phase::Evaluation,
        Phase::Variation,
        Phase::Selection,
        Phase::Persistence,
        Phase::Statistics,
    ];

    fn name(&self) -> &'static str {
        match self {
            Phase::Evaluation => "evaluation",
            Phase::Variation => "crossover and mutation",
            Phase::Selection => "selection",
            Phase::Persistence => "persistence",
            Phase::Statistics => "statistics",
        }
    }
}

#[derive(Debug, Clone)]
pub struct PhaseTimers {
    timers: Vec<Timer>,
}

impl Default for PhaseTimers {
    fn default() -> Self {
        PhaseTimers { timers: Phase::ALL.iter().map(|p| Timer::new(p.name())).collect() }
    }
}

impl PhaseTimers {
    pub fn new() -> Self {
        Self::default()
    }

    fn index(phase: Phase) -> usize {
        Phase::ALL.iter().position(|&p| p == phase).unwrap_or(0)
    }

    pub fn start(&mut self, phase: Phase) {
        self.timers[Self::index(phase)].start();
    }

    pub fn stop(&mut self, phase: Phase) {
        self.timers[Self::index(phase)].stop();
    }

    pub fn total(&self, phase: Phase) -> f64 {
        self.timers[Self::index(phase)].total()
    }

    /// Run `f` inside `phase`
    pub fn time<T>(&mut self, phase: Phase, f: impl FnOnce() -> T) -> T {
        self.start(phase);
        let out = f();
        self.stop(phase);
        out
    }

    pub fn summary(&self) -> String {
        self.timers.iter()
            .map(|t| format!("{}: {:.2}s", t.name(), t.total()))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer_accumulates() {
        let mut timer = Timer::new("evaluation");
        timer.start();
        std::thread::sleep(Duration::from_millis(5));
        timer.stop();
        let first = timer.total();
        assert!(first > 0.0);

        timer.stop();
        assert_eq!(timer.total(), first);
    }

    #[test]
    fn test_phase_summary() {
        let mut timers = PhaseTimers::new();
        let value = timers.time(Phase::Selection, || 42);
        assert_eq!(value, 42);
        assert_eq!(timers.total(Phase::Evaluation), 0.0);

        let summary = timers.summary();
        assert!(summary.contains("selection:"));
        assert!(summary.contains("crossover and mutation:"));
    }
}
