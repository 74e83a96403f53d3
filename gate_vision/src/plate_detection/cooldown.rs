use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CooldownMode {
    /// One trigger suppresses every plate for the window.
    #[default]
    Global,
    /// Each authorized plate has its own window.
    PerPlate,
}

/// Debounces triggers. Only `record_trigger` mutates it.
#[derive(Clone, Debug)]
pub struct CooldownTracker {
    mode: CooldownMode,
    cooldown: Duration,
    last_trigger_at: Option<Duration>,
    per_plate_last_trigger_at: HashMap<String, Duration>,
}

impl CooldownTracker {
    pub fn new(mode: CooldownMode, cooldown: Duration) -> Self {
        Self {
            mode,
            cooldown,
            last_trigger_at: None,
            per_plate_last_trigger_at: HashMap::new(),
        }
    }

    pub fn mode(&self) -> CooldownMode {
        self.mode
    }

    pub fn is_electable(&self, plate: &str, now: Duration) -> bool {
        let last = match self.mode {
            CooldownMode::Global => self.last_trigger_at,
            CooldownMode::PerPlate => self.per_plate_last_trigger_at.get(plate).copied(),
        };
        match last {
            None => true,
            Some(last) => now.saturating_sub(last) > self.cooldown,
        }
    }

    /// Time left before `plate` becomes electable again.
    pub fn remaining(&self, plate: &str, now: Duration) -> Duration {
        let last = match self.mode {
            CooldownMode::Global => self.last_trigger_at,
            CooldownMode::PerPlate => self.per_plate_last_trigger_at.get(plate).copied(),
        };
        last.map_or(Duration::ZERO, |last| {
            (last + self.cooldown).saturating_sub(now)
        })
    }

    pub fn record_trigger(&mut self, plate: &str, now: Duration) {
        self.last_trigger_at = Some(now);
        self.per_plate_last_trigger_at.insert(plate.to_string(), now);
    }

    pub fn last_trigger_at(&self) -> Option<Duration> {
        self.last_trigger_at
    }
}
