//! Bandwidth profiles, throughput metering and keepalive round-trip times.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// How much entity-movement traffic a client is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BandwidthMode {
    /// Use the server's configured mode.
    Default,
    VeryLow,
    Low,
    #[default]
    Normal,
    High,
    VeryHigh,
}

/// View-sync tuning derived from a [`BandwidthMode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BandwidthProfile {
    /// Hidden entities closer than this (squared fixed-point units) are shown.
    pub show_threshold: i64,
    /// Shown entities farther than this are hidden.
    pub hide_threshold: i64,
    /// Send relative move/rotate packets when the delta fits.
    pub partial_updates: bool,
    /// Drop every other tiny movement update.
    pub skip_updates: bool,
    /// Time between view-sync ticks.
    pub refresh_interval: Duration,
}

const fn blocks_squared(blocks: i64) -> i64 {
    (blocks * 32) * (blocks * 32)
}

impl BandwidthMode {
    /// Replace `Default` with `server_mode`. A server mode of `Default`
    /// means `Normal`.
    pub fn resolve(self, server_mode: BandwidthMode) -> BandwidthMode {
        match (self, server_mode) {
            (Self::Default, Self::Default) => Self::Normal,
            (Self::Default, mode) => mode,
            (mode, _) => mode,
        }
    }

    pub fn profile(self) -> BandwidthProfile {
        let (show, hide, partial_updates, skip_updates, refresh_ms) = match self {
            Self::VeryLow => (blocks_squared(40), blocks_squared(42), true, true, 100),
            Self::Low => (blocks_squared(50), blocks_squared(52), true, true, 50),
            Self::Default | Self::Normal => {
                (blocks_squared(68), blocks_squared(70), true, false, 50)
            }
            Self::High => (blocks_squared(128), blocks_squared(130), true, false, 50),
            Self::VeryHigh => (i64::MAX, i64::MAX, false, false, 25),
        };
        BandwidthProfile {
            show_threshold: show,
            hide_threshold: hide,
            partial_updates,
            skip_updates,
            refresh_interval: Duration::from_millis(refresh_ms),
        }
    }
}

/// Byte rates recomputed every keepalive.
#[derive(Debug, Clone)]
pub struct BandwidthMeter {
    last_at: Instant,
    last_sent: u64,
    last_received: u64,
    sent_rate: f64,
    received_rate: f64,
}

impl BandwidthMeter {
    pub fn new(now: Instant) -> Self {
        Self {
            last_at: now,
            last_sent: 0,
            last_received: 0,
            sent_rate: 0.0,
            received_rate: 0.0,
        }
    }

    /// Update rates from running byte totals.
    pub fn measure(&mut self, now: Instant, sent: u64, received: u64) {
        let secs = now.saturating_duration_since(self.last_at).as_secs_f64();
        if secs <= 0.0 {
            return;
        }
        self.sent_rate = sent.saturating_sub(self.last_sent) as f64 / secs;
        self.received_rate = received.saturating_sub(self.last_received) as f64 / secs;
        self.last_at = now;
        self.last_sent = sent;
        self.last_received = received;
    }

    /// Bytes per second sent to the client.
    pub fn sent_rate(&self) -> f64 {
        self.sent_rate
    }

    pub fn received_rate(&self) -> f64 {
        self.received_rate
    }
}

const PING_SAMPLES: usize = 10;

/// Round-trip times of the last ten keepalives.
#[derive(Debug, Clone, Default)]
pub struct PingTracker {
    samples: [u32; PING_SAMPLES],
    count: usize,
    next: usize,
    sent_at: Option<Instant>,
}

impl PingTracker {
    pub fn start(&mut self, now: Instant) {
        self.sent_at = Some(now);
    }

    /// Record the echo of the last keepalive. Unsolicited echoes are ignored.
    pub fn finish(&mut self, now: Instant) -> Option<u32> {
        let sent_at = self.sent_at.take()?;
        let ms = now.saturating_duration_since(sent_at).as_millis();
        let ms = u32::try_from(ms).unwrap_or(u32::MAX);
        self.samples[self.next] = ms;
        self.next = (self.next + 1) % PING_SAMPLES;
        self.count = (self.count + 1).min(PING_SAMPLES);
        Some(ms)
    }

    pub fn last(&self) -> Option<u32> {
        (self.count > 0).then(|| self.samples[(self.next + PING_SAMPLES - 1) % PING_SAMPLES])
    }

    pub fn average(&self) -> Option<f64> {
        if self.count == 0 {
            return None;
        }
        let total: u64 = if self.count < PING_SAMPLES {
            self.samples[..self.count].iter().map(|&s| u64::from(s)).sum()
        } else {
            self.samples.iter().map(|&s| u64::from(s)).sum()
        };
        Some(total as f64 / self.count as f64)
    }
}
