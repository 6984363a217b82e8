use chrono::{DateTime, Duration, Utc};
use std::fmt;

/// Decides whether a record is still eligible to live in a partition
/// given its age and the cumulative size of the log up to and including
/// it. A zero limit disables the corresponding dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    max_age: Duration,
    max_size_bytes: u64,
    time_based: bool,
    size_based: bool,
}

impl RetentionPolicy {
    pub fn new(max_age: Duration, max_size_bytes: u64) -> Self {
        Self {
            max_age,
            max_size_bytes,
            time_based: max_age > Duration::zero(),
            size_based: max_size_bytes > 0,
        }
    }

    pub fn set_max_age(&mut self, max_age: Duration) {
        self.max_age = max_age;
        self.time_based = max_age > Duration::zero();
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    pub fn set_max_size(&mut self, max_size_bytes: u64) {
        self.max_size_bytes = max_size_bytes;
        self.size_based = max_size_bytes > 0;
    }

    pub fn max_size(&self) -> u64 {
        self.max_size_bytes
    }

    /// Whether a record created at `message_time` is past the age limit
    pub fn is_expired(&self, message_time: DateTime<Utc>) -> bool {
        self.time_based && Utc::now() - message_time > self.max_age
    }

    /// Whether `current_size` is past the size limit
    pub fn is_size_exceeded(&self, current_size: u64) -> bool {
        self.size_based && current_size > self.max_size_bytes
    }

    /// Whether a record should be retained
    ///
    /// `current_size` is the running sum of estimated record sizes in
    /// offset order up to and including the record under evaluation.
    pub fn should_retain(&self, message_time: DateTime<Utc>, current_size: u64) -> bool {
        if self.is_expired(message_time) {
            return false;
        }
        if self.is_size_exceeded(current_size) {
            return false;
        }
        true
    }
}

impl Default for RetentionPolicy {
    /// Seven days, one GiB
    fn default() -> Self {
        Self::new(Duration::days(7), 1024 * 1024 * 1024)
    }
}

impl fmt::Display for RetentionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RetentionPolicy(max_age=")?;
        if self.time_based {
            write!(f, "{}h", self.max_age.num_hours())?;
        } else {
            write!(f, "unlimited")?;
        }
        write!(f, ", max_size=")?;
        if self.size_based {
            const GIB: u64 = 1024 * 1024 * 1024;
            const MIB: u64 = 1024 * 1024;
            if self.max_size_bytes >= GIB {
                write!(f, "{:.1}GB", self.max_size_bytes as f64 / GIB as f64)?;
            } else if self.max_size_bytes >= MIB {
                write!(f, "{:.1}MB", self.max_size_bytes as f64 / MIB as f64)?;
            } else {
                write!(f, "{}B", self.max_size_bytes)?;
            }
        } else {
            write!(f, "unlimited")?;
        }
        write!(f, ")")
    }
}
