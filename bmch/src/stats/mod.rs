//! Run statistics: named facts and wall-clock timers

use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

use serde::{Serialize, Serializer};

#[derive(Debug, Clone, Default)]
struct Timer {
    total: Duration,
    started: Option<Instant>,
}

impl Timer {
    fn elapsed(&self) -> Duration {
        match self.started {
            Some(start) => self.total + start.elapsed(),
            None => self.total,
        }
    }
}

impl Serialize for Timer {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.elapsed().as_secs_f64())
    }
}

/// Append-only statistics of one run
#[derive(Debug, Clone, Default, Serialize)]
pub struct Stats {
    facts: BTreeMap<String, String>,
    timers: BTreeMap<String, Timer>,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a string fact
    pub fn sset(&mut self, name: &str, value: impl Into<String>) {
        self.facts.insert(name.to_string(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.facts.get(name).map(String::as_str)
    }

    /// Start or continue a timer
    pub fn resume(&mut self, name: &str) {
        let timer = self.timers.entry(name.to_string()).or_default();
        if timer.started.is_none() {
            timer.started = Some(Instant::now());
        }
    }

    pub fn stop(&mut self, name: &str) {
        if let Some(timer) = self.timers.get_mut(name)
            && let Some(start) = timer.started.take()
        {
            timer.total += start.elapsed();
        }
    }

    pub fn elapsed(&self, name: &str) -> Option<Duration> {
        self.timers.get(name).map(Timer::elapsed)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.facts {
            writeln!(f, "{name}: {value}")?;
        }
        for (name, timer) in &self.timers {
            writeln!(f, "{name}: {:.3}s", timer.elapsed().as_secs_f64())?;
        }
        Ok(())
    }
}
