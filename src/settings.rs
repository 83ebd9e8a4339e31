use once_cell::sync::Lazy;
use std::{env, time::Duration};

/// Holds all tunables, read-once from ENV with fallbacks.
#[derive(Debug, Clone)]
pub struct Settings {
    pub visibility_threshold: f64,
    pub interaction_timeout: Duration,
    pub request_timeout: Duration,
    pub event_buffer_capacity: usize,
    pub api_base_url: String,
    pub start_muted: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            visibility_threshold: 0.7,
            interaction_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(10),
            event_buffer_capacity: 100,
            api_base_url: "http://localhost:5000".to_string(),
            start_muted: true,
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        // optionally load .env
        let _ = dotenvy::dotenv();

        fn parse_usize(var: &str, default: usize) -> usize {
            env::var(var)
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default)
        }

        fn parse_secs(var: &str, default: Duration) -> Duration {
            env::var(var)
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(default)
        }

        fn parse_ratio(var: &str, default: f64) -> f64 {
            env::var(var)
                .ok()
                .and_then(|v| v.parse::<f64>().ok())
                .filter(|r| (0.0..=1.0).contains(r))
                .unwrap_or(default)
        }

        fn parse_bool(var: &str, default: bool) -> bool {
            match env::var(var).ok().as_deref() {
                Some("1") | Some("true") => true,
                Some("0") | Some("false") => false,
                _ => default,
            }
        }

        let defaults = Settings::default();
        Settings {
            visibility_threshold: parse_ratio(
                "FEED_VISIBILITY_THRESHOLD",
                defaults.visibility_threshold,
            ),
            interaction_timeout: parse_secs(
                "INTERACTION_TIMEOUT_SECS",
                defaults.interaction_timeout,
            ),
            request_timeout: parse_secs("REQUEST_TIMEOUT_SECS", defaults.request_timeout),
            event_buffer_capacity: parse_usize(
                "EVENT_BUFFER_CAPACITY",
                defaults.event_buffer_capacity,
            ),
            api_base_url: env::var("FEED_API_URL").unwrap_or(defaults.api_base_url),
            start_muted: parse_bool("FEED_START_MUTED", defaults.start_muted),
        }
    }
}

/// Global settings instance
pub static SETTINGS: Lazy<Settings> = Lazy::new(Settings::from_env);
