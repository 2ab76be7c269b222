//! File locking strategies

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use super::error::FileError;

/// Attempts made to take the cross-process lock before giving up
pub const DEFAULT_LOCK_ATTEMPTS: u32 = 10;

/// Pause between cross-process lock attempts
pub const DEFAULT_LOCK_BACKOFF: Duration = Duration::from_millis(5);

/// How an appender shares its file with other writers
///
/// All modes report the same metadata after a write returns; they differ in
/// how many handles and syscalls that costs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LockingMode {
    /// One handle for the appender's lifetime, metadata kept in memory
    #[default]
    Exclusive,
    /// Open, write, flush and close on every write
    Minimal,
    /// Exclusive plus an OS advisory lock around every write
    CrossProcess,
}

impl LockingMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Exclusive => "exclusive",
            Self::Minimal => "minimal",
            Self::CrossProcess => "cross_process",
        }
    }

    /// Whether the appender keeps its handle open between writes
    #[inline]
    pub const fn keeps_handle(self) -> bool {
        !matches!(self, Self::Minimal)
    }
}

impl fmt::Display for LockingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LockingMode {
    type Err = FileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "exclusive" => Ok(Self::Exclusive),
            "minimal" => Ok(Self::Minimal),
            "cross_process" | "crossprocess" | "shared" => Ok(Self::CrossProcess),
            other => Err(FileError::invalid_setting(format!(
                "unknown locking mode '{other}'"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_locking_mode() {
        assert_eq!("Exclusive".parse::<LockingMode>().unwrap(), LockingMode::Exclusive);
        assert_eq!("minimal".parse::<LockingMode>().unwrap(), LockingMode::Minimal);
        assert_eq!(
            "cross-process".parse::<LockingMode>().unwrap(),
            LockingMode::CrossProcess
        );
        assert!("sometimes".parse::<LockingMode>().is_err());
    }

    #[test]
    fn test_round_trip_display() {
        for mode in [
            LockingMode::Exclusive,
            LockingMode::Minimal,
            LockingMode::CrossProcess,
        ] {
            assert_eq!(mode.to_string().parse::<LockingMode>().unwrap(), mode);
        }
    }
}
