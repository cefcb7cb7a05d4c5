use std::collections::HashMap;
use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Configurable rate limit values, read from environment variables with
/// defaults.
///
/// Environment variables:
/// - `RATE_LIMIT_RATE` — steady-state actions per second per source (default: 10)
/// - `RATE_LIMIT_GRACE` — burst grace window in seconds (default: 300)
///
/// A source may burst `rate * grace` actions before any limiting takes
/// effect, then is held to `rate` actions per second.
#[derive(Debug, Clone, Copy)]
pub struct LimiterConfig {
    pub rate: f64,
    pub grace_secs: f64,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            rate: 10.0,
            grace_secs: 300.0,
        }
    }
}

impl LimiterConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(val) = env::var("RATE_LIMIT_RATE")
            && let Ok(n) = val.parse::<f64>()
            && n > 0.0
        {
            config.rate = n;
        }
        if let Ok(val) = env::var("RATE_LIMIT_GRACE")
            && let Ok(n) = val.parse::<f64>()
            && n >= 0.0
        {
            config.grace_secs = n;
        }
        config
    }
}

/// Token-bucket gate for one source identity. The whole state is a single
/// "next allowed" instant that each action pushes `1/rate` further into the
/// future; the reported cooldown is how far that horizon sits beyond the
/// grace window.
pub struct SourceLimiter {
    config: LimiterConfig,
    next_allowed: Option<Instant>,
}

impl SourceLimiter {
    pub fn new(config: LimiterConfig) -> Self {
        Self {
            config,
            next_allowed: None,
        }
    }

    /// Charge one action and return the seconds the caller must wait, 0 if
    /// none.
    pub fn check_and_increment(&mut self) -> f64 {
        self.check_at(Instant::now())
    }

    fn check_at(&mut self, now: Instant) -> f64 {
        let base = match self.next_allowed {
            Some(t) if t > now => t,
            _ => now,
        };
        let next = base + Duration::from_secs_f64(1.0 / self.config.rate);
        self.next_allowed = Some(next);
        let ahead = next.saturating_duration_since(now).as_secs_f64();
        (ahead - self.config.grace_secs).max(0.0)
    }
}

/// One limiter per distinct source key (typically client IP), shared across
/// every room so a source's budget survives reconnects and room hops.
pub struct LimiterRegistry {
    config: LimiterConfig,
    sources: Mutex<HashMap<String, Arc<Mutex<SourceLimiter>>>>,
}

impl LimiterRegistry {
    pub fn new(config: LimiterConfig) -> Self {
        Self {
            config,
            sources: Mutex::new(HashMap::new()),
        }
    }

    pub fn source(&self, key: &str) -> Arc<Mutex<SourceLimiter>> {
        let mut sources = self.sources.lock().unwrap_or_else(|e| e.into_inner());
        sources
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(SourceLimiter::new(self.config))))
            .clone()
    }
}

/// Optimistic per-session wrapper around a source's limiter. The first
/// action passes immediately; while a cooldown sleep is pending, further
/// actions are rejected without consulting the limiter.
pub struct IngressGate {
    limiter: Arc<Mutex<SourceLimiter>>,
    in_cooldown: Arc<AtomicBool>,
}

impl IngressGate {
    pub fn new(limiter: Arc<Mutex<SourceLimiter>>) -> Self {
        Self {
            limiter,
            in_cooldown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns true when the action may proceed. Must be called from within
    /// a tokio runtime (the cooldown timer is a spawned sleep).
    pub fn try_accept(&self) -> bool {
        if self.in_cooldown.swap(true, Ordering::SeqCst) {
            return false;
        }
        let cooldown = self
            .limiter
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .check_and_increment();
        if cooldown <= 0.0 {
            self.in_cooldown.store(false, Ordering::SeqCst);
        } else {
            let flag = self.in_cooldown.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs_f64(cooldown)).await;
                flag.store(false, Ordering::SeqCst);
            });
        }
        true
    }
}
