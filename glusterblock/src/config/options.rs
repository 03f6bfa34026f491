//! GlusterFS client option validation.
//!
//! Every client option the driver forwards to `glusterfs` has a validator
//! in [`VALIDATORS`]. Options are checked once while the configuration is
//! built; the mount manager only ever sees validated pairs.

use std::collections::BTreeMap;

use crate::errors::{BlockError, BlockResult};

/// Checks the value of a single option. Returns a reason on rejection.
pub type OptionValidator = fn(&str) -> Result<(), String>;

/// Option name to validator table.
pub const VALIDATORS: &[(&str, OptionValidator)] = &[
    ("log-level", log_level),
    ("log-file", absolute_path),
    ("read-only", flag),
    ("acl", flag),
    ("selinux", flag),
    ("enable-ino32", flag),
    ("fopen-keep-cache", flag),
    ("attribute-timeout", seconds),
    ("entry-timeout", seconds),
    ("negative-timeout", seconds),
    ("direct-io-mode", direct_io_mode),
    ("volfile-server-port", port),
    ("volfile-server-transport", transport),
    ("reader-thread-count", positive_integer),
    ("background-qlen", positive_integer),
    ("lru-limit", integer),
];

/// Look up the validator for `key`.
pub fn validator_for(key: &str) -> Option<OptionValidator> {
    VALIDATORS
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, validator)| *validator)
}

/// Validate one client option.
pub fn check_option(key: &str, value: &str) -> BlockResult<()> {
    let validator = validator_for(key)
        .ok_or_else(|| BlockError::Config(format!("unknown option '{key}'")))?;
    validator(value).map_err(|reason| BlockError::Config(format!("option '{key}': {reason}")))
}

/// Render validated options as `glusterfs` command line arguments.
///
/// Flags (empty value) become `--key`, everything else `--key=value`.
pub fn to_mount_args(options: &BTreeMap<String, String>) -> Vec<String> {
    options
        .iter()
        .map(|(key, value)| {
            if value.is_empty() {
                format!("--{key}")
            } else {
                format!("--{key}={value}")
            }
        })
        .collect()
}

fn flag(value: &str) -> Result<(), String> {
    if value.is_empty() {
        Ok(())
    } else {
        Err(format!("takes no value, got '{value}'"))
    }
}

fn log_level(value: &str) -> Result<(), String> {
    const LEVELS: &[&str] = &["CRITICAL", "ERROR", "WARNING", "INFO", "DEBUG", "TRACE", "NONE"];
    if LEVELS.contains(&value) {
        Ok(())
    } else {
        Err(format!("expected one of {}, got '{value}'", LEVELS.join("|")))
    }
}

fn absolute_path(value: &str) -> Result<(), String> {
    if value.starts_with('/') {
        Ok(())
    } else {
        Err(format!("expected an absolute path, got '{value}'"))
    }
}

fn seconds(value: &str) -> Result<(), String> {
    match value.parse::<f64>() {
        Ok(secs) if secs.is_finite() && secs >= 0.0 => Ok(()),
        _ => Err(format!("expected a non-negative number of seconds, got '{value}'")),
    }
}

fn direct_io_mode(value: &str) -> Result<(), String> {
    match value {
        "auto" | "enable" | "disable" => Ok(()),
        _ => Err(format!("expected auto|enable|disable, got '{value}'")),
    }
}

fn port(value: &str) -> Result<(), String> {
    match value.parse::<u16>() {
        Ok(p) if p > 0 => Ok(()),
        _ => Err(format!("expected a port number, got '{value}'")),
    }
}

fn transport(value: &str) -> Result<(), String> {
    match value {
        "tcp" | "rdma" | "unix" => Ok(()),
        _ => Err(format!("expected tcp|rdma|unix, got '{value}'")),
    }
}

fn positive_integer(value: &str) -> Result<(), String> {
    match value.parse::<u32>() {
        Ok(n) if n > 0 => Ok(()),
        _ => Err(format!("expected a positive integer, got '{value}'")),
    }
}

fn integer(value: &str) -> Result<(), String> {
    value
        .parse::<i64>()
        .map(|_| ())
        .map_err(|_| format!("expected an integer, got '{value}'"))
}
