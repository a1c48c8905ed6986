//! Typed environment variable readers
//!
//! Unset variables fall back to defaults; set-but-unparseable variables are
//! reported as [`CommonError::InvalidEnv`] instead of being silently replaced.

use std::env::VarError;
use std::fmt::Display;
use std::str::FromStr;

use crate::error::{CommonError, Result};

/// Read and parse `key`, returning `None` when it is unset or blank.
pub fn env_opt<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: Display,
{
    let raw = match std::env::var(key) {
        Ok(raw) => raw,
        Err(VarError::NotPresent) => return Ok(None),
        Err(VarError::NotUnicode(_)) => {
            return Err(CommonError::NotUnicode {
                key: key.to_string(),
            })
        },
    };

    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    trimmed
        .parse()
        .map(Some)
        .map_err(|e: T::Err| CommonError::InvalidEnv {
            key: key.to_string(),
            value: raw.clone(),
            reason: e.to_string(),
        })
}

/// Read and parse `key`, falling back to `default` when it is unset.
pub fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    Ok(env_opt(key)?.unwrap_or(default))
}

/// Read a boolean flag. Accepts `true/false`, `1/0`, `yes/no`, `on/off`.
pub fn env_flag(key: &str, default: bool) -> Result<bool> {
    let Some(raw) = env_opt::<String>(key)? else {
        return Ok(default);
    };

    match raw.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(CommonError::InvalidEnv {
            key: key.to_string(),
            value: raw,
            reason: "expected a boolean".to_string(),
        }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_env_or_default_when_unset() {
        std::env::remove_var("HNPIPE_TEST_UNSET");
        assert_eq!(env_or("HNPIPE_TEST_UNSET", 42usize).unwrap(), 42);
    }

    #[test]
    #[serial]
    fn test_env_or_parses_value() {
        std::env::set_var("HNPIPE_TEST_NUM", " 250 ");
        assert_eq!(env_or("HNPIPE_TEST_NUM", 1usize).unwrap(), 250);
        std::env::remove_var("HNPIPE_TEST_NUM");
    }

    #[test]
    #[serial]
    fn test_env_opt_rejects_garbage() {
        std::env::set_var("HNPIPE_TEST_BAD", "lots");
        let err = env_opt::<u64>("HNPIPE_TEST_BAD").unwrap_err();
        assert!(matches!(err, CommonError::InvalidEnv { ref key, .. } if key == "HNPIPE_TEST_BAD"));
        std::env::remove_var("HNPIPE_TEST_BAD");
    }

    #[test]
    #[serial]
    fn test_env_flag_variants() {
        std::env::set_var("HNPIPE_TEST_FLAG", "Yes");
        assert!(env_flag("HNPIPE_TEST_FLAG", false).unwrap());
        std::env::set_var("HNPIPE_TEST_FLAG", "0");
        assert!(!env_flag("HNPIPE_TEST_FLAG", true).unwrap());
        std::env::set_var("HNPIPE_TEST_FLAG", "maybe");
        assert!(env_flag("HNPIPE_TEST_FLAG", true).is_err());
        std::env::remove_var("HNPIPE_TEST_FLAG");
        assert!(env_flag("HNPIPE_TEST_FLAG", true).unwrap());
    }
}
