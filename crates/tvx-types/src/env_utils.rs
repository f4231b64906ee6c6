//! Environment variable parsing utilities.
//!
//! Used for the configuration knobs that have no CLI flag (RPC timeouts,
//! engine command fallbacks).
//!
//! # Example
//!
//! ```
//! use tvx_types::env_utils::{env_string, env_var_or};
//!
//! let timeout: u64 = env_var_or("TVX_RPC_TIMEOUT_SECS", 30);
//! let api = env_string("FULLNODE_API_INFO");
//! ```

use std::str::FromStr;

/// Parse an environment variable into a type that implements `FromStr`.
///
/// Returns `None` if the variable is not set or cannot be parsed.
pub fn env_var<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Parse an environment variable with a default value.
pub fn env_var_or<T: FromStr>(key: &str, default: T) -> T {
    env_var(key).unwrap_or(default)
}

/// Get a non-empty environment variable as a string.
pub fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
