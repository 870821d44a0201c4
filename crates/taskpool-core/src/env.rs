//! Environment variable overrides for default configuration.
//!
//! Mirrors the generic `env_get`/`env_get_bool` helpers the rest of this
//! codebase's scheduler crates use, so configuration defaults are
//! overridable without a config file.

use std::str::FromStr;

/// Get environment variable parsed as type `T`, or return `default`.
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

/// Get environment variable as a boolean.
///
/// Accepts "1", "true", "yes", "on" (case-insensitive) as true. Anything
/// else, including unset, returns `default`.
#[inline]
pub fn env_get_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => matches!(val.to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_var_uses_default() {
        let v: usize = env_get("TASKPOOL_DOES_NOT_EXIST_XYZ", 7);
        assert_eq!(v, 7);
    }

    #[test]
    fn bool_parsing() {
        std::env::set_var("TASKPOOL_TEST_BOOL_FLAG", "yes");
        assert!(env_get_bool("TASKPOOL_TEST_BOOL_FLAG", false));
        std::env::remove_var("TASKPOOL_TEST_BOOL_FLAG");
    }
}
