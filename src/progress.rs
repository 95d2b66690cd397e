//! Progress reporting for compress and extract operations

use std::sync::Arc;

/// Snapshot handed to the progress callback
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    pub processed_bytes: u64,
    pub total_bytes: u64,
    /// 0.0 to 100.0, never decreasing within one operation
    pub percent: f32,
}

/// Progress callback function type
pub type ProgressCallback = dyn Fn(Progress) + Send + Sync;

/// Accumulates processed bytes and fires the callback once per whole percent
pub(crate) struct ProgressTracker {
    callback: Option<Arc<ProgressCallback>>,
    total_bytes: u64,
    processed_bytes: u64,
    last_reported: Option<u32>,
}

impl ProgressTracker {
    pub(crate) fn new(callback: Option<Arc<ProgressCallback>>, total_bytes: u64) -> Self {
        Self {
            callback,
            total_bytes,
            processed_bytes: 0,
            last_reported: None,
        }
    }

    pub(crate) fn advance(&mut self, bytes: u64) {
        self.processed_bytes = self.processed_bytes.saturating_add(bytes);
        self.report(false);
    }

    /// Set the absolute number of processed bytes
    pub(crate) fn update(&mut self, processed_bytes: u64) {
        if processed_bytes > self.processed_bytes {
            self.processed_bytes = processed_bytes;
            self.report(false);
        }
    }

    /// Force a final 100% report
    pub(crate) fn complete(&mut self) {
        self.processed_bytes = self.processed_bytes.max(self.total_bytes);
        self.report(true);
    }

    fn report(&mut self, done: bool) {
        let Some(callback) = &self.callback else {
            return;
        };

        let percent = if done {
            100.0
        } else if self.total_bytes == 0 {
            0.0
        } else {
            // Sizes can change between the pre-walk and the actual read
            ((self.processed_bytes as f64 / self.total_bytes as f64) * 100.0).min(100.0) as f32
        };

        let whole = percent.floor() as u32;
        if self.last_reported.is_some_and(|last| whole <= last) {
            return;
        }
        self.last_reported = Some(whole);

        callback(Progress {
            processed_bytes: self.processed_bytes,
            total_bytes: self.total_bytes,
            percent,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_reports_once_per_percent() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let mut tracker = ProgressTracker::new(
            Some(Arc::new(move |p: Progress| sink.lock().unwrap().push(p.percent))),
            1000,
        );

        for _ in 0..1000 {
            tracker.advance(1);
        }
        tracker.complete();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 101);
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(*seen.last().unwrap(), 100.0);
    }

    #[test]
    fn test_empty_total_reports_completion() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let mut tracker = ProgressTracker::new(
            Some(Arc::new(move |p: Progress| sink.lock().unwrap().push(p.percent))),
            0,
        );
        tracker.complete();
        assert_eq!(*seen.lock().unwrap(), vec![100.0]);
    }
}
