use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::models::room::Color;
use crate::services::timer::TimerHandle;

/// Both time banks of a running game. Elapsed time is measured on the
/// monotonic clock between charges, never assumed from the tick period.
#[derive(Debug, Clone)]
pub struct GameClock {
    white_ms: u64,
    black_ms: u64,
    last_charge: Instant,
}

impl GameClock {
    pub fn resume(white_ms: u64, black_ms: u64) -> Self {
        GameClock {
            white_ms,
            black_ms,
            last_charge: Instant::now(),
        }
    }

    /// Debits the time since the previous charge to `turn`. Returns what
    /// that side has left. Banks never go below zero.
    pub fn charge(&mut self, turn: Color, now: Instant) -> u64 {
        let elapsed = now.saturating_duration_since(self.last_charge).as_millis() as u64;
        self.last_charge = now;
        let bank = match turn {
            Color::White => &mut self.white_ms,
            Color::Black => &mut self.black_ms,
        };
        *bank = bank.saturating_sub(elapsed);
        *bank
    }

    pub fn remaining(&self, color: Color) -> u64 {
        match color {
            Color::White => self.white_ms,
            Color::Black => self.black_ms,
        }
    }
}

/// Starts and stops per-room tick tasks.
#[derive(Debug, Clone)]
pub struct ClockService {
    tick: Duration,
}

impl ClockService {
    pub fn new(tick: Duration) -> Self {
        ClockService { tick }
    }

    pub fn start<T, F>(&self, sender: mpsc::Sender<T>, tick: F) -> TimerHandle
    where
        T: Send + 'static,
        F: Fn() -> T + Send + 'static,
    {
        TimerHandle::every(self.tick, sender, tick)
    }
}
