use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// Fixed-window limits for one endpoint class.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 5,
            window: Duration::from_secs(15 * 60),
        }
    }
}

#[derive(Debug)]
struct WindowState {
    window_index: i64,
    count: u32,
}

/// Per-caller fixed-window counter. Windows are wall-clock aligned
/// (`unix_secs / window_secs`), so every caller rolls over at the same
/// boundary. Protects against caller abuse, independent of circuit state.
pub struct FixedWindowLimiter {
    config: RateLimitConfig,
    windows: Mutex<HashMap<String, WindowState>>,
}

impl FixedWindowLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn allow(&self, caller_key: &str) -> bool {
        self.allow_at(caller_key, chrono::Utc::now().timestamp())
    }

    fn allow_at(&self, caller_key: &str, now_secs: i64) -> bool {
        let window_secs = self.config.window.as_secs().max(1) as i64;
        let window_index = now_secs.div_euclid(window_secs);

        let mut windows = self.windows.lock().expect("limiter lock not poisoned");
        // Entries from earlier windows can never be consulted again; drop
        // them so callers that go quiet do not pin map entries forever.
        windows.retain(|_, state| state.window_index >= window_index);
        let state = windows
            .entry(caller_key.to_string())
            .or_insert(WindowState {
                window_index,
                count: 0,
            });

        if state.window_index != window_index {
            state.window_index = window_index;
            state.count = 0;
        }

        if state.count >= self.config.max_requests {
            return false;
        }
        state.count += 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max_requests: u32, window_secs: u64) -> FixedWindowLimiter {
        FixedWindowLimiter::new(RateLimitConfig {
            max_requests,
            window: Duration::from_secs(window_secs),
        })
    }

    #[test]
    fn sixth_call_in_a_window_is_rejected() {
        let limiter = limiter(5, 60);
        for _ in 0..5 {
            assert!(limiter.allow_at("client-1", 1_000));
        }
        assert!(!limiter.allow_at("client-1", 1_000));
        assert!(!limiter.allow_at("client-1", 1_059));
    }

    #[test]
    fn window_rollover_resets_the_count() {
        let limiter = limiter(5, 60);
        for _ in 0..6 {
            let _ = limiter.allow_at("client-1", 1_000);
        }
        // 1_000 is in window 16; 1_080 is in window 18.
        assert!(limiter.allow_at("client-1", 1_080));
    }

    #[test]
    fn callers_are_counted_independently() {
        let limiter = limiter(1, 60);
        assert!(limiter.allow_at("client-1", 1_000));
        assert!(!limiter.allow_at("client-1", 1_000));
        assert!(limiter.allow_at("client-2", 1_000));
    }

    #[test]
    fn stale_caller_windows_are_swept_on_later_calls() {
        let limiter = limiter(5, 60);
        assert!(limiter.allow_at("client-1", 1_000));
        // A call in a later window evicts the quiet caller's entry.
        assert!(limiter.allow_at("client-2", 1_080));

        let windows = limiter.windows.lock().unwrap();
        assert!(!windows.contains_key("client-1"));
        assert_eq!(windows.len(), 1);
    }

    #[test]
    fn boundaries_are_wall_clock_aligned() {
        let limiter = limiter(1, 60);
        // 119 and 120 sit in adjacent aligned windows.
        assert!(limiter.allow_at("client-1", 119));
        assert!(limiter.allow_at("client-1", 120));
        assert!(!limiter.allow_at("client-1", 121));
    }
}
