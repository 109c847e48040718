//! Server configuration from environment variables

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },

    #[error("No question file given (pass a path or set QUESTIONS_FILE)")]
    MissingQuestions,
}

/// Per-connection transport limits
#[derive(Debug, Clone)]
pub struct ConnConfig {
    /// Largest inbound message accepted, in bytes
    pub max_message_size: usize,
    /// The peer must show signs of life within this window
    pub pong_wait: Duration,
    /// Interval between pings, always shorter than `pong_wait`
    pub ping_period: Duration,
    /// Deadline for writing a single frame
    pub write_wait: Duration,
    /// Outbound queue capacity. Overflowing it drops the connection.
    pub send_queue_size: usize,
}

impl ConnConfig {
    pub fn with_pong_wait(mut self, pong_wait: Duration) -> Self {
        self.pong_wait = pong_wait;
        self.ping_period = pong_wait * 9 / 10;
        self
    }
}

impl Default for ConnConfig {
    fn default() -> Self {
        Self {
            max_message_size: 512,
            pong_wait: Duration::from_secs(60),
            ping_period: Duration::from_secs(54),
            write_wait: Duration::from_secs(10),
            send_queue_size: 500,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    pub questions_file: Option<PathBuf>,
    pub static_dir: PathBuf,
    pub conn: ConnConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            questions_file: None,
            static_dir: PathBuf::from("static"),
            conn: ConnConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load config from environment variables, falling back to defaults
    /// for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let port: u16 = env_parse("PORT")?.unwrap_or(defaults.addr.port());
        let ip = env_parse("BIND_ADDR")?.unwrap_or(defaults.addr.ip());

        let questions_file = env_string("QUESTIONS_FILE").map(PathBuf::from);
        let static_dir = env_string("STATIC_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.static_dir);

        let mut conn = defaults.conn;
        if let Some(size) = env_parse("MAX_MESSAGE_SIZE")? {
            conn.max_message_size = size;
        }
        if let Some(secs) = env_parse::<u64>("PONG_WAIT_SECS")? {
            if secs == 0 {
                return Err(ConfigError::Invalid {
                    name: "PONG_WAIT_SECS",
                    value: secs.to_string(),
                });
            }
            conn = conn.with_pong_wait(Duration::from_secs(secs));
        }
        if let Some(secs) = env_parse("WRITE_WAIT_SECS")? {
            conn.write_wait = Duration::from_secs(secs);
        }
        if let Some(size) = env_parse::<usize>("SEND_QUEUE_SIZE")? {
            if size == 0 {
                return Err(ConfigError::Invalid {
                    name: "SEND_QUEUE_SIZE",
                    value: size.to_string(),
                });
            }
            conn.send_queue_size = size;
        }

        Ok(Self {
            addr: SocketAddr::new(ip, port),
            questions_file,
            static_dir,
            conn,
        })
    }

    /// A path given on the command line wins over `QUESTIONS_FILE`.
    pub fn with_questions_arg(mut self, arg: Option<String>) -> Self {
        if let Some(path) = arg {
            self.questions_file = Some(PathBuf::from(path));
        }
        self
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn env_parse<T: FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match env_string(name) {
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { name, value }),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: &[&str] = &[
        "PORT",
        "BIND_ADDR",
        "QUESTIONS_FILE",
        "STATIC_DIR",
        "MAX_MESSAGE_SIZE",
        "PONG_WAIT_SECS",
        "WRITE_WAIT_SECS",
        "SEND_QUEUE_SIZE",
    ];

    fn clear_env() {
        for var in VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_defaults() {
        clear_env();
        let config = ServerConfig::from_env().unwrap();
        assert_eq!(config.addr.port(), 8080);
        assert!(config.questions_file.is_none());
        assert_eq!(config.conn.max_message_size, 512);
        assert_eq!(config.conn.pong_wait, Duration::from_secs(60));
        assert!(config.conn.ping_period < config.conn.pong_wait);
        assert_eq!(config.conn.send_queue_size, 500);
    }

    #[test]
    #[serial]
    fn test_overrides() {
        clear_env();
        std::env::set_var("PORT", "9000");
        std::env::set_var("QUESTIONS_FILE", "quiz.csv");
        std::env::set_var("PONG_WAIT_SECS", "20");
        std::env::set_var("SEND_QUEUE_SIZE", "32");

        let config = ServerConfig::from_env().unwrap();
        assert_eq!(config.addr.port(), 9000);
        assert_eq!(config.questions_file, Some(PathBuf::from("quiz.csv")));
        assert_eq!(config.conn.pong_wait, Duration::from_secs(20));
        assert_eq!(config.conn.ping_period, Duration::from_secs(18));
        assert_eq!(config.conn.send_queue_size, 32);

        let config = config.with_questions_arg(Some("other.csv".to_string()));
        assert_eq!(config.questions_file, Some(PathBuf::from("other.csv")));
        clear_env();
    }

    #[test]
    #[serial]
    fn test_invalid_value() {
        clear_env();
        std::env::set_var("PORT", "not-a-port");
        assert!(matches!(
            ServerConfig::from_env(),
            Err(ConfigError::Invalid { name: "PORT", .. })
        ));
        clear_env();

        std::env::set_var("PONG_WAIT_SECS", "0");
        assert!(ServerConfig::from_env().is_err());
        clear_env();
    }
}
