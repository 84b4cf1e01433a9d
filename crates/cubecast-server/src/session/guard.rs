//! Movement integrity checks: speed/jump limits with a one-sample grace
//! period, and a sliding-window packet-rate limiter.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use cubecast_proto::types::Position;

use crate::config::AntiCheatSection;

/// Vertical jump (fixed-point units) a frozen player may report before
/// being snapped back.
const RESTRAINED_MAX_DY: i32 = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardConfig {
    pub enabled: bool,
    pub max_distance_squared: i64,
    pub max_jump: i32,
    pub max_packet_count: usize,
    pub max_packet_interval: Duration,
}

impl From<&AntiCheatSection> for GuardConfig {
    fn from(section: &AntiCheatSection) -> Self {
        Self {
            enabled: section.enabled,
            max_distance_squared: section.max_distance_squared,
            max_jump: section.max_jump_delta,
            max_packet_count: section.max_packet_count,
            max_packet_interval: Duration::from_millis(section.max_packet_interval_ms),
        }
    }
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self::from(&AntiCheatSection::default())
    }
}

/// Flags movement packets arriving faster than `max_count` per `interval`.
#[derive(Debug, Clone)]
pub struct PacketRateLimiter {
    log: VecDeque<Instant>,
    max_count: usize,
    interval: Duration,
}

impl PacketRateLimiter {
    pub fn new(max_count: usize, interval: Duration) -> Self {
        Self {
            log: VecDeque::with_capacity(max_count),
            max_count,
            interval,
        }
    }

    /// Record a packet at `now`. Returns true when it is spam; spam is not
    /// recorded.
    pub fn check(&mut self, now: Instant) -> bool {
        if self.max_count == 0 {
            return false;
        }
        if self.log.len() >= self.max_count {
            if let Some(oldest) = self.log.pop_front() {
                if now.saturating_duration_since(oldest) < self.interval {
                    return true;
                }
            }
        }
        self.log.push_back(now);
        false
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveRequest {
    pub current: Position,
    pub proposed: Position,
    /// Rank and account both allow speedhacking.
    pub exempt: bool,
    /// Frozen, or inside a zone that denies movement.
    pub restrained: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveVerdict {
    /// Nothing changed; ignore the packet.
    Unchanged,
    Accept(Position),
    /// Only the rotation is taken. `correct` asks for a teleport back to the
    /// current position.
    Clamp { position: Position, correct: bool },
    /// Move the client back to `revert_to`.
    Deny { revert_to: Position, spam: bool },
}

#[derive(Debug, Clone)]
pub struct MovementGuard {
    config: GuardConfig,
    limiter: PacketRateLimiter,
    violations: u32,
    last_good: Position,
}

impl MovementGuard {
    pub fn new(config: GuardConfig) -> Self {
        Self {
            limiter: PacketRateLimiter::new(config.max_packet_count, config.max_packet_interval),
            config,
            violations: 0,
            last_good: Position::ZERO,
        }
    }

    pub fn last_good(&self) -> Position {
        self.last_good
    }

    /// Forget pending violations after a server-side teleport.
    pub fn reset(&mut self, position: Position) {
        self.violations = 0;
        self.last_good = position;
    }

    pub fn check(&mut self, request: MoveRequest, now: Instant) -> MoveVerdict {
        let MoveRequest {
            current,
            proposed,
            exempt,
            restrained,
        } = request;
        let delta = current.delta_to(proposed);
        if delta.is_zero() {
            return MoveVerdict::Unchanged;
        }

        if restrained {
            let correct = delta.horizontal_distance_squared() > self.config.max_distance_squared
                || delta.dy.abs() > RESTRAINED_MAX_DY;
            return MoveVerdict::Clamp {
                position: current.with_rotation(proposed.yaw, proposed.pitch),
                correct,
            };
        }

        if exempt || !self.config.enabled {
            return MoveVerdict::Accept(proposed);
        }

        if self.limiter.check(now) {
            return MoveVerdict::Deny {
                revert_to: current,
                spam: true,
            };
        }

        let too_far = delta.horizontal_distance_squared() > self.config.max_distance_squared
            || delta.dy > self.config.max_jump;
        if !too_far {
            self.violations = 0;
            return MoveVerdict::Accept(proposed);
        }
        if self.violations == 0 {
            self.last_good = current;
            self.violations = 1;
            return MoveVerdict::Accept(proposed);
        }
        self.violations = 0;
        MoveVerdict::Deny {
            revert_to: self.last_good,
            spam: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(x: i16, y: i16, z: i16) -> Position {
        Position::new(x, y, z, 0, 0)
    }

    fn request(current: Position, proposed: Position) -> MoveRequest {
        MoveRequest {
            current,
            proposed,
            exempt: false,
            restrained: false,
        }
    }

    #[test]
    fn same_position_is_unchanged() {
        let mut guard = MovementGuard::new(GuardConfig::default());
        let p = pos(100, 64, 100);
        assert_eq!(
            guard.check(request(p, p), Instant::now()),
            MoveVerdict::Unchanged
        );
    }

    #[test]
    fn small_steps_are_accepted() {
        let mut guard = MovementGuard::new(GuardConfig::default());
        let from = pos(100, 64, 100);
        let to = pos(110, 70, 120);
        assert_eq!(
            guard.check(request(from, to), Instant::now()),
            MoveVerdict::Accept(to)
        );
    }

    #[test]
    fn two_violations_revert_once() {
        let mut guard = MovementGuard::new(GuardConfig::default());
        let now = Instant::now();
        let a = pos(0, 64, 0);
        let b = pos(100, 64, 0);
        let c = pos(200, 64, 0);
        assert_eq!(guard.check(request(a, b), now), MoveVerdict::Accept(b));
        assert_eq!(guard.last_good(), a);
        assert_eq!(
            guard.check(request(b, c), now),
            MoveVerdict::Deny {
                revert_to: a,
                spam: false
            }
        );
        // counter reset: the next jump is a first offence again
        let d = pos(0, 64, 100);
        assert_eq!(guard.check(request(a, d), now), MoveVerdict::Accept(d));
    }

    #[test]
    fn violation_then_normal_step_is_forgiven() {
        let mut guard = MovementGuard::new(GuardConfig::default());
        let now = Instant::now();
        let a = pos(0, 64, 0);
        let b = pos(100, 64, 0);
        let c = pos(101, 64, 0);
        let d = pos(201, 64, 0);
        assert_eq!(guard.check(request(a, b), now), MoveVerdict::Accept(b));
        assert_eq!(guard.check(request(b, c), now), MoveVerdict::Accept(c));
        assert_eq!(guard.check(request(c, d), now), MoveVerdict::Accept(d));
    }

    #[test]
    fn upward_jump_limit_only() {
        let mut guard = MovementGuard::new(GuardConfig::default());
        let now = Instant::now();
        let top = pos(0, 200, 0);
        let bottom = pos(0, 100, 0);
        // falling is fine
        assert_eq!(guard.check(request(top, bottom), now), MoveVerdict::Accept(bottom));
        // jumping 100 units is a violation (first one is tolerated)
        assert_eq!(guard.check(request(bottom, top), now), MoveVerdict::Accept(top));
        assert!(matches!(
            guard.check(request(top, pos(0, 300, 0)), now),
            MoveVerdict::Deny { .. }
        ));
    }

    #[test]
    fn exempt_players_skip_checks() {
        let mut guard = MovementGuard::new(GuardConfig::default());
        let now = Instant::now();
        let mut req = request(pos(0, 64, 0), pos(1000, 64, 0));
        req.exempt = true;
        for _ in 0..3 {
            assert!(matches!(guard.check(req, now), MoveVerdict::Accept(_)));
        }
    }

    #[test]
    fn restrained_players_keep_rotation_only() {
        let mut guard = MovementGuard::new(GuardConfig::default());
        let now = Instant::now();
        let current = pos(50, 64, 50);
        let mut req = request(current, Position::new(52, 64, 50, 90, 10));
        req.restrained = true;
        assert_eq!(
            guard.check(req, now),
            MoveVerdict::Clamp {
                position: Position::new(50, 64, 50, 90, 10),
                correct: false
            }
        );
        req.proposed = pos(50, 120, 50);
        assert_eq!(
            guard.check(req, now),
            MoveVerdict::Clamp {
                position: current,
                correct: true
            }
        );
    }

    #[test]
    fn spam_denies_packet_over_cap() {
        let config = GuardConfig {
            max_packet_count: 5,
            ..GuardConfig::default()
        };
        let mut guard = MovementGuard::new(config);
        let now = Instant::now();
        let mut current = pos(0, 64, 0);
        for i in 1..=5 {
            let next = pos(i, 64, 0);
            assert_eq!(guard.check(request(current, next), now), MoveVerdict::Accept(next));
            current = next;
        }
        assert_eq!(
            guard.check(request(current, pos(6, 64, 0)), now),
            MoveVerdict::Deny {
                revert_to: current,
                spam: true
            }
        );
    }

    #[test]
    fn spaced_packets_never_spam() {
        let mut limiter = PacketRateLimiter::new(3, Duration::from_secs(5));
        let start = Instant::now();
        for i in 0..20u64 {
            assert!(!limiter.check(start + Duration::from_secs(2 * i)));
        }
    }

    #[test]
    fn burst_after_quiet_period() {
        let mut limiter = PacketRateLimiter::new(3, Duration::from_secs(5));
        let start = Instant::now();
        for _ in 0..3 {
            assert!(!limiter.check(start));
        }
        assert!(limiter.check(start + Duration::from_secs(1)));
        assert!(!limiter.check(start + Duration::from_secs(10)));
    }
}
