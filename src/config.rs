//! Environment configuration.

use std::env;

#[derive(Debug, Clone, Default)]
pub struct EnvConfig {
    /// `TAPE_TEA_LOG`: write logs to this file.
    pub log_file: Option<String>,
    /// `TAPE_TEA_DEBUG=1`: log at debug level.
    pub debug: bool,
    /// `TAPE_TEA_QUEUE_CAPACITY`: event queue bound.
    pub queue_capacity: Option<usize>,
}

impl EnvConfig {
    pub fn from_env() -> Self {
        Self {
            log_file: env_string_opt("TAPE_TEA_LOG"),
            debug: env_flag("TAPE_TEA_DEBUG"),
            queue_capacity: env_string_opt("TAPE_TEA_QUEUE_CAPACITY")
                .and_then(|value| value.trim().parse::<usize>().ok())
                .filter(|capacity| *capacity > 0),
        }
    }
}

fn env_flag(key: &str) -> bool {
    env::var(key).map(|value| value == "1").unwrap_or(false)
}

fn env_string_opt(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        if value.trim().is_empty() {
            None
        } else {
            Some(value)
        }
    })
}
