//! Progress indicators for long-running operations
//!
//! Uses `linya`, which can draw from many concurrent tasks without allocating per tick.
//! Bars are drawn on stderr and only in human output mode.

use linya::{Bar, Progress};
use std::sync::{Arc, Mutex, MutexGuard};

/// A single bar that concurrently running tasks can advance
#[derive(Clone)]
pub struct TaskProgress {
  progress: Arc<Mutex<Progress>>,
  bar: Arc<Bar>,
}

impl TaskProgress {
  pub fn new(total: usize, label: impl Into<String>) -> Self {
    let mut progress = Progress::new();
    let bar = progress.bar(total, label.into());
    Self {
      progress: Arc::new(Mutex::new(progress)),
      bar: Arc::new(bar),
    }
  }

  fn lock(&self) -> MutexGuard<'_, Progress> {
    self.progress.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
  }

  /// Increment by 1 and redraw
  pub fn inc(&self) {
    self.lock().inc_and_draw(&self.bar, 1);
  }
}
