//! Progress reporting for fairing calls.
//!
//! A fairing call walks a fixed sequence of stages. [`Progress`] receives one
//! update per stage transition, which is enough to drive a status line or to
//! record the order in which stages ran.
//!
//! # Example
//!
//! ```
//! use fairmesh::algo::Progress;
//!
//! let progress = Progress::new(|step, total, stage| {
//!     println!("[{}/{}] {}", step, total, stage);
//! });
//! progress.report(1, 6, "Selecting");
//! ```

/// A progress callback that receives updates during a fairing call.
///
/// The callback receives:
/// - `step`: index of the stage just entered
/// - `total`: index of the final stage
/// - `stage`: name of the stage just entered
pub struct Progress {
    callback: Box<dyn Fn(usize, usize, &str) + Send + Sync>,
}

impl Progress {
    /// Create a new progress reporter with the given callback.
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(usize, usize, &str) + Send + Sync + 'static,
    {
        Self {
            callback: Box::new(callback),
        }
    }

    /// Report entering a stage.
    #[inline]
    pub fn report(&self, step: usize, total: usize, stage: &str) {
        (self.callback)(step, total, stage);
    }

    /// Create a reporter that discards all updates.
    pub fn none() -> Self {
        Self::new(|_, _, _| {})
    }
}

impl Default for Progress {
    fn default() -> Self {
        Self::none()
    }
}

impl std::fmt::Debug for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Progress").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_report_forwards_to_callback() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let progress = Progress::new(move |step, total, stage| {
            sink.lock().unwrap().push((step, total, stage.to_string()));
        });

        progress.report(2, 6, "Assembling");
        assert_eq!(seen.lock().unwrap().as_slice(), &[(2, 6, "Assembling".to_string())]);
    }

    #[test]
    fn test_none_is_silent() {
        Progress::none().report(0, 0, "");
        Progress::default().report(1, 1, "Done");
    }
}
