use std::str::FromStr;

/// Chat API configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection string.
    pub database_url: String,
    /// Port the HTTP server binds to.
    pub port: u16,
    /// Only admit connections to rooms whose two participants are friends,
    /// and only route frames between those participants.
    pub require_friendship: bool,
    /// Seconds between server pings. A connection silent for two intervals is closed.
    pub ping_interval_secs: u64,
    /// Capacity of each connection's outbound frame queue.
    pub outbound_buffer: usize,
    /// Worker id embedded in generated message ids.
    pub worker_id: u16,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Panics with a descriptive message if a required variable is missing.
    pub fn from_env() -> Self {
        Self {
            database_url: required_var("DATABASE_URL"),
            port: parsed_var("PORT", 8001),
            require_friendship: flag_var("CHAT_REQUIRE_FRIENDSHIP"),
            ping_interval_secs: parsed_var("CHAT_PING_INTERVAL_SECS", 30).max(1),
            outbound_buffer: parsed_var("CHAT_OUTBOUND_BUFFER", 256).max(1),
            worker_id: parsed_var("SNOWFLAKE_WORKER_ID", 0),
        }
    }
}

fn required_var(name: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| panic!("{name} env var is required"))
}

fn parsed_var<T: FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn flag_var(name: &str) -> bool {
    std::env::var(name).map(|v| parse_flag(&v)).unwrap_or(false)
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_accept_common_truthy_values() {
        for v in ["1", "true", "TRUE", " yes ", "on"] {
            assert!(parse_flag(v), "{v:?} should be true");
        }
        for v in ["", "0", "false", "no", "enabled"] {
            assert!(!parse_flag(v), "{v:?} should be false");
        }
    }

    #[test]
    fn parsed_var_falls_back_on_garbage() {
        std::env::set_var("CHAT_TEST_PARSED_VAR", "not-a-number");
        assert_eq!(parsed_var("CHAT_TEST_PARSED_VAR", 42u16), 42);
        std::env::set_var("CHAT_TEST_PARSED_VAR", " 17 ");
        assert_eq!(parsed_var("CHAT_TEST_PARSED_VAR", 42u16), 17);
        std::env::remove_var("CHAT_TEST_PARSED_VAR");
        assert_eq!(parsed_var("CHAT_TEST_PARSED_VAR", 42u16), 42);
    }
}
