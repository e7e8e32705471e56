use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Consider tenant configuration stale after 1 hour.
/// Stale data is still served; it only means a refresh is due.
const CACHE_STALE_MINUTES: i64 = 60;

/// Display units in minutes, largest first.
const AGE_UNITS: [(i64, &str); 3] = [(24 * 60, "d"), (60, "h"), (1, "m")];

/// Whole `unit`s in `minutes`, half a unit rounding up.
fn rounded(minutes: i64, unit: i64) -> i64 {
    (minutes + unit / 2) / unit
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedData<T> {
    pub data: T,
    pub cached_at: DateTime<Utc>,
}

impl<T> CachedData<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            cached_at: Utc::now(),
        }
    }

    pub fn age_minutes(&self) -> i64 {
        let now = Utc::now();
        (now - self.cached_at).num_minutes()
    }

    /// Coarse age for status lines, in the largest unit that fits.
    pub fn age_display(&self) -> String {
        let minutes = self.age_minutes();
        // Clock skew lands in the first arm too
        match AGE_UNITS.iter().find(|(unit, _)| minutes >= *unit) {
            Some(&(unit, suffix)) => format!("{}{} ago", rounded(minutes, unit), suffix),
            None => "just now".to_string(),
        }
    }

    pub fn is_stale(&self) -> bool {
        self.age_minutes() > CACHE_STALE_MINUTES
    }
}
