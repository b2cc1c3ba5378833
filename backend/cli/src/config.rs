use tracing::warn;

/// Runtime configuration, environment-driven.
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite database path (tasks and run log share one file).
    pub db_path: String,
    /// Admin API bind address for the `serve` daemon.
    pub bind_address: String,
    /// Admin API port.
    pub port: u16,
    /// Upper bound on concurrently running HTTP executions.
    pub max_concurrency: usize,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
    /// Trust any TLS certificate when calling task endpoints.
    pub accept_invalid_certs: bool,
    /// Shutdown grace period for in-flight executions, in seconds.
    pub shutdown_grace_secs: u64,
    /// Cap on stored response bodies, in bytes.
    pub max_response_bytes: usize,
    /// Run-log retention in days; 0 disables pruning.
    pub log_retention_days: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: "cronhook.db".to_string(),
            bind_address: "127.0.0.1".to_string(),
            port: 8780,
            max_concurrency: 16,
            request_timeout_secs: 30,
            accept_invalid_certs: false,
            shutdown_grace_secs: 30,
            max_response_bytes: 64 * 1024,
            log_retention_days: 30,
        }
    }
}

impl Config {
    /// Load configuration from environment variables with sensible defaults.
    pub fn from_env() -> Self {
        let defaults = Config::default();
        Self {
            db_path: std::env::var("CRONHOOK_DB").unwrap_or(defaults.db_path),
            bind_address: std::env::var("CRONHOOK_BIND").unwrap_or(defaults.bind_address),
            port: env_parse("CRONHOOK_PORT", defaults.port),
            max_concurrency: env_parse("CRONHOOK_MAX_CONCURRENCY", defaults.max_concurrency),
            request_timeout_secs: env_parse("CRONHOOK_TIMEOUT_SECS", defaults.request_timeout_secs),
            accept_invalid_certs: env_parse_bool(
                "CRONHOOK_ACCEPT_INVALID_CERTS",
                defaults.accept_invalid_certs,
            ),
            shutdown_grace_secs: env_parse("CRONHOOK_GRACE_SECS", defaults.shutdown_grace_secs),
            max_response_bytes: env_parse("CRONHOOK_MAX_RESPONSE_BYTES", defaults.max_response_bytes),
            log_retention_days: env_parse("CRONHOOK_LOG_RETENTION_DAYS", defaults.log_retention_days),
        }
    }

    /// Base URL of the admin API, used by commands talking to a running daemon.
    pub fn admin_url(&self) -> String {
        // Commands always dial loopback; bind_address is for the listener.
        format!("http://127.0.0.1:{}", self.port)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => match raw.parse() {
            Ok(v) => v,
            Err(_) => {
                warn!(key, value = %raw, "unparseable value, using default");
                default
            }
        },
        Err(_) => default,
    }
}

fn env_parse_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(raw) => match parse_bool(&raw) {
            Some(v) => v,
            None => {
                warn!(key, value = %raw, "unparseable boolean, using default");
                default
            }
        },
        Err(_) => default,
    }
}

/// Accepts the usual spellings: 1/0, true/false, yes/no, on/off.
fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
