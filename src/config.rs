use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use anyhow::{Context, Result};
use chrono::{Duration, FixedOffset};

/// Slot generation settings shared by every tutor.
#[derive(Clone, Copy, Debug)]
pub struct SlotSettings {
    /// The fixed length of a regular session in minutes.
    pub session_duration_minutes: u32,
    /// The gap left between two consecutive slots in minutes.
    pub buffer_minutes: u32,
    /// The length of a trial session in minutes.
    pub trial_duration_minutes: u32,
}

impl Default for SlotSettings {
    fn default() -> Self {
        Self {
            session_duration_minutes: 25,
            buffer_minutes: 5,
            trial_duration_minutes: 25,
        }
    }
}

/// Elapsed-time thresholds for cancel and reschedule.
#[derive(Clone, Copy, Debug)]
pub struct LifecyclePolicy {
    /// Cancellation is refused when the session starts sooner than this.
    pub cancel_floor: Duration,
    /// A completed purchase is refunded when cancelled at least this far ahead.
    pub refund_threshold: Duration,
    /// Rescheduling is refused when the session starts sooner than this.
    pub reschedule_floor: Duration,
}

impl Default for LifecyclePolicy {
    fn default() -> Self {
        Self {
            cancel_floor: Duration::hours(2),
            refund_threshold: Duration::hours(24),
            reschedule_floor: Duration::hours(4),
        }
    }
}

/// Where slot locks live.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockBackend {
    /// Shared by every node through Redis.
    Redis,
    /// Process-local; only valid when a single node serves bookings.
    Memory,
}

impl FromStr for LockBackend {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "redis" => Ok(LockBackend::Redis),
            "memory" => Ok(LockBackend::Memory),
            other => anyhow::bail!("Unknown slot lock backend: {}", other),
        }
    }
}

/// The application's configuration.
#[derive(Clone)]
pub struct Config {
    /// The URL of the PostgreSQL database.
    pub database_url: String,
    /// The URL of the Redis server.
    pub redis_url: String,
    /// The address the HTTP server binds to.
    pub bind_addr: SocketAddr,
    /// Slot generation settings.
    pub slots: SlotSettings,
    /// Cancel/reschedule thresholds.
    pub policy: LifecyclePolicy,
    /// How long a slot lock lives, in seconds.
    pub slot_lock_ttl_secs: u64,
    /// Where slot locks are stored.
    pub slot_lock_backend: LockBackend,
    /// How often the reminder sweep runs, in seconds.
    pub reminder_sweep_interval_secs: u64,
    /// The offset in which session dates and times are expressed.
    pub schedule_offset: FixedOffset,
    /// Base URL of the meeting-room service. Meetings are skipped when unset.
    pub meeting_api_url: Option<String>,
    /// Shared secret expected on payment-outcome callbacks.
    pub payment_webhook_secret: String,
}

fn parse_or<T: FromStr>(name: &str, default: T) -> Result<T> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid {}", name)),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Creates a new `Config` from environment variables.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `Config`.
    pub fn from_env() -> Result<Self> {
        let defaults = SlotSettings::default();
        let slots = SlotSettings {
            session_duration_minutes: parse_or("SESSION_DURATION_MINUTES", defaults.session_duration_minutes)?,
            buffer_minutes: parse_or("SESSION_BUFFER_MINUTES", defaults.buffer_minutes)?,
            trial_duration_minutes: parse_or("TRIAL_DURATION_MINUTES", defaults.trial_duration_minutes)?,
        };

        if slots.session_duration_minutes == 0 || slots.trial_duration_minutes == 0 {
            anyhow::bail!("SESSION_DURATION_MINUTES and TRIAL_DURATION_MINUTES must be positive");
        }

        let policy = LifecyclePolicy {
            cancel_floor: Duration::hours(parse_or("CANCEL_FLOOR_HOURS", 2)?),
            refund_threshold: Duration::hours(parse_or("REFUND_THRESHOLD_HOURS", 24)?),
            reschedule_floor: Duration::hours(parse_or("RESCHEDULE_FLOOR_HOURS", 4)?),
        };

        let offset_minutes: i32 = parse_or("SCHEDULE_UTC_OFFSET_MINUTES", 0)?;
        let schedule_offset = FixedOffset::east_opt(offset_minutes * 60)
            .context("SCHEDULE_UTC_OFFSET_MINUTES is out of range")?;

        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .context("DATABASE_URL must be set")?,
            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
            bind_addr: env::var("BIND_ADDR")
                .unwrap_or_else(|_| "127.0.0.1:3000".to_string())
                .parse()
                .context("Invalid BIND_ADDR")?,
            slots,
            policy,
            slot_lock_ttl_secs: parse_or("SLOT_LOCK_TTL_SECS", 300)?,
            slot_lock_backend: parse_or("SLOT_LOCK_BACKEND", LockBackend::Redis)?,
            reminder_sweep_interval_secs: parse_or("REMINDER_SWEEP_INTERVAL_SECS", 300)?,
            schedule_offset,
            meeting_api_url: env::var("MEETING_API_URL").ok().filter(|url| !url.is_empty()),
            payment_webhook_secret: env::var("PAYMENT_WEBHOOK_SECRET")
                .context("PAYMENT_WEBHOOK_SECRET must be set")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_backend_parsing() {
        assert_eq!("redis".parse::<LockBackend>().unwrap(), LockBackend::Redis);
        assert_eq!("Memory".parse::<LockBackend>().unwrap(), LockBackend::Memory);
        assert!("etcd".parse::<LockBackend>().is_err());
    }
}
