//! Record model and severity scale.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Integer severity levels, monotonic (higher is more severe).
pub mod level {
    pub const FINEST: i32 = 300;
    pub const FINER: i32 = 400;
    pub const FINE: i32 = 500;
    pub const CONFIG: i32 = 700;
    pub const INFO: i32 = 800;
    pub const WARNING: i32 = 900;
    pub const SEVERE: i32 = 1000;

    /// Name of the closest named level at or below `severity`.
    pub fn name(severity: i32) -> &'static str {
        match severity {
            s if s >= SEVERE => "SEVERE",
            s if s >= WARNING => "WARNING",
            s if s >= INFO => "INFO",
            s if s >= CONFIG => "CONFIG",
            s if s >= FINE => "FINE",
            s if s >= FINER => "FINER",
            _ => "FINEST",
        }
    }

    /// Parse a level name (case-insensitive) or a decimal value.
    pub fn parse(s: &str) -> Option<i32> {
        let s = s.trim();
        if let Ok(n) = s.parse::<i32>() {
            return Some(n);
        }
        let level = match s.to_ascii_uppercase().as_str() {
            "FINEST" => FINEST,
            "FINER" => FINER,
            "FINE" | "DEBUG" => FINE,
            "CONFIG" => CONFIG,
            "INFO" => INFO,
            "WARNING" | "WARN" => WARNING,
            "SEVERE" | "ERROR" => SEVERE,
            _ => return None,
        };
        Some(level)
    }
}

/// Coarse severity grouping used for filtering and display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SeverityBucket {
    /// Below INFO
    Debug,
    /// INFO and above, below WARNING
    Monitoring,
    /// WARNING and above, below SEVERE
    Warning,
    /// SEVERE and above
    Critical,
}

impl SeverityBucket {
    pub const ALL: [SeverityBucket; 4] = [
        SeverityBucket::Debug,
        SeverityBucket::Monitoring,
        SeverityBucket::Warning,
        SeverityBucket::Critical,
    ];

    pub fn from_severity(severity: i32) -> Self {
        if severity >= level::SEVERE {
            SeverityBucket::Critical
        } else if severity >= level::WARNING {
            SeverityBucket::Warning
        } else if severity >= level::INFO {
            SeverityBucket::Monitoring
        } else {
            SeverityBucket::Debug
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SeverityBucket::Debug => "debug",
            SeverityBucket::Monitoring => "monitoring",
            SeverityBucket::Warning => "warning",
            SeverityBucket::Critical => "critical",
        }
    }
}

impl fmt::Display for SeverityBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One record as held in memory and persisted in the record index.
///
/// Field order is the on-disk order of an index entry:
/// `logger_id:i32, timestamp_millis:i64, severity:i32, body_start:i64, body_end:i64`.
/// `body_end` is exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LogRecord {
    pub logger_id: u32,
    pub timestamp_millis: i64,
    pub severity: i32,
    pub body_start: u64,
    pub body_end: u64,
}

impl LogRecord {
    pub fn bucket(&self) -> SeverityBucket {
        SeverityBucket::from_severity(self.severity)
    }

    /// Message length in bytes
    pub fn body_len(&self) -> u64 {
        self.body_end.saturating_sub(self.body_start)
    }
}

/// Segment after the last `.` of a logger name.
pub fn short_logger_name(name: &str) -> &str {
    match name.rfind('.') {
        Some(pos) if pos + 1 < name.len() => &name[pos + 1..],
        _ => name,
    }
}
