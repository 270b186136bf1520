//! Time-boxed processing markers
//!
//! A flag map used to collapse near-simultaneous work on the same key.
//! A marker expires on its own after the window even if nobody clears it,
//! so a lost `clear` never blocks a key forever. This is a debouncing aid
//! only and carries no guarantee across processes.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::time::{Duration, Instant};

pub struct ProcessingMarkers {
    marks: DashMap<String, Instant>,
    window: Duration,
}

impl ProcessingMarkers {
    pub fn new(window: Duration) -> Self {
        Self {
            marks: DashMap::new(),
            window,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Mark `key` as in progress.
    ///
    /// Returns false when a live marker already exists, meaning the caller
    /// should leave the work to whoever set it.
    pub fn try_mark(&self, key: &str) -> bool {
        let now = Instant::now();
        match self.marks.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                if now.duration_since(*entry.get()) < self.window {
                    false
                } else {
                    entry.insert(now);
                    true
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(now);
                true
            }
        }
    }

    pub fn clear(&self, key: &str) {
        self.marks.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_mark_is_refused() {
        let markers = ProcessingMarkers::new(Duration::from_secs(60));

        assert!(markers.try_mark("alerts"));
        assert!(!markers.try_mark("alerts"));
        assert!(markers.try_mark("visitors"));
    }

    #[test]
    fn test_clear_releases_key() {
        let markers = ProcessingMarkers::new(Duration::from_secs(60));

        assert!(markers.try_mark("alerts"));
        markers.clear("alerts");
        assert!(markers.try_mark("alerts"));
        assert!(!markers.try_mark("alerts"));
    }

    #[test]
    fn test_marker_expires_after_window() {
        let markers = ProcessingMarkers::new(Duration::from_millis(10));

        assert!(markers.try_mark("notices"));
        assert!(!markers.try_mark("notices"));
        std::thread::sleep(Duration::from_millis(25));

        assert!(markers.try_mark("notices"));
    }
}
