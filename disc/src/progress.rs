// SPDX-License-Identifier: MPL-2.0

//! Progress reporting and cancellation for long reads.

use std::sync::{
    atomic::{AtomicBool, AtomicU32, Ordering},
    Mutex,
    PoisonError,
};

/// A sink polled once per sector by multi-sector reads.
///
/// Cancellation is cooperative: a read checks [`Progress::is_cancelled`] at each sector boundary
/// and never in the middle of one.
pub trait Progress {
    fn is_cancelled(&self) -> bool;

    /// Receives a status label and the fraction of the read completed so far, in `[0, 1)`.
    fn update(&self, label: &str, fraction: f32);
}

/// A [`Progress`] that can be shared between a loader thread and whoever is watching it.
#[derive(Debug, Default)]
pub struct LoadProgress {
    cancelled: AtomicBool,
    /// The bits of an `f32`.
    fraction: AtomicU32,
    label: Mutex<String>,
}

impl LoadProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Asks the read in progress to stop at the next sector boundary.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn fraction(&self) -> f32 {
        f32::from_bits(self.fraction.load(Ordering::Relaxed))
    }

    pub fn label(&self) -> String {
        self.label.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl Progress for LoadProgress {
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    fn update(&self, label: &str, fraction: f32) {
        self.fraction.store(fraction.to_bits(), Ordering::Relaxed);

        let mut current = self.label.lock().unwrap_or_else(PoisonError::into_inner);
        if *current != label {
            label.clone_into(&mut *current);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use super::*;

    #[test]
    fn updates_are_visible_across_threads() {
        let progress = Arc::new(LoadProgress::new());

        let loader = {
            let progress = Arc::clone(&progress);
            thread::spawn(move || progress.update("Loading...", 0.5))
        };
        loader.join().unwrap();

        assert_eq!(0.5, progress.fraction());
        assert_eq!("Loading...", progress.label());
        assert!(!progress.is_cancelled());

        progress.cancel();
        assert!(progress.is_cancelled());
    }
}
