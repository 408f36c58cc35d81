//! Cooperative per-class admission control for remote writes.
//!
//! One [`RateGovernor`] is shared by a whole run. Each [`RateClass`] has its
//! own rolling 60-second window and ceiling. Callers wait with
//! [`RateGovernor::block_until_allowed`] before a write and report it with
//! [`RateGovernor::record_operation`] right after. The result approximates a
//! leaky bucket; it is not a hard guarantee.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use migration::RateLimits;
use tokio::time::Instant;
use tracing::{debug, info};

/// Length of every rolling window.
pub const WINDOW: Duration = Duration::from_secs(60);

/// An independently governed category of remote write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RateClass {
    /// Issue creation and closing.
    Issue,
    /// Comment creation.
    Comment,
}

impl std::fmt::Display for RateClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RateClass::Issue => f.write_str("issue"),
            RateClass::Comment => f.write_str("comment"),
        }
    }
}

/// Usage of one class's window at the time of the query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowStats {
    pub in_window: usize,
    pub ceiling: u32,
}

#[derive(Debug)]
struct RateWindow {
    timestamps: VecDeque<Instant>,
    ceiling: u32,
}

impl RateWindow {
    fn new(ceiling: u32) -> Self {
        Self {
            timestamps: VecDeque::new(),
            ceiling,
        }
    }

    fn purge(&mut self, now: Instant) {
        while let Some(&oldest) = self.timestamps.front() {
            if now.duration_since(oldest) >= WINDOW {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    fn has_capacity(&self) -> bool {
        self.timestamps.len() < self.ceiling as usize
    }
}

/// Shared rate budget for a migration run.
#[derive(Debug)]
pub struct RateGovernor {
    windows: Mutex<HashMap<RateClass, RateWindow>>,
}

impl RateGovernor {
    pub fn new(limits: RateLimits) -> Self {
        let windows = HashMap::from([
            (RateClass::Issue, RateWindow::new(limits.issues_per_minute)),
            (RateClass::Comment, RateWindow::new(limits.comments_per_minute)),
        ]);
        Self {
            windows: Mutex::new(windows),
        }
    }

    // The windows hold only timestamps, so a panic mid-update cannot leave
    // them in a state worth refusing to read.
    fn lock(&self) -> MutexGuard<'_, HashMap<RateClass, RateWindow>> {
        self.windows.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `f` on the purged window for `class`.
    fn with_window<T>(&self, class: RateClass, f: impl FnOnce(&mut RateWindow, Instant) -> T) -> T {
        let now = Instant::now();
        let mut windows = self.lock();
        let window = windows.entry(class).or_insert_with(|| RateWindow::new(0));
        window.purge(now);
        f(window, now)
    }

    /// `true` iff fewer than the ceiling's worth of operations remain in the
    /// class's window.
    pub fn can_proceed(&self, class: RateClass) -> bool {
        self.with_window(class, |window, _| window.has_capacity())
    }

    /// Records a write performed now.
    pub fn record_operation(&self, class: RateClass) {
        self.with_window(class, |window, now| {
            window.timestamps.push_back(now);
            window.purge(now);
        });
    }

    /// How long the caller must wait before the oldest entry leaves the
    /// window; `None` when no wait is needed.
    fn required_wait(&self, class: RateClass) -> Option<Duration> {
        self.with_window(class, |window, now| {
            if window.has_capacity() {
                return None;
            }
            let oldest = *window.timestamps.front()?;
            let wait = WINDOW.saturating_sub(now.duration_since(oldest));
            (!wait.is_zero()).then_some(wait)
        })
    }

    /// Suspends the caller until the class's window has room.
    ///
    /// Returns immediately if there is capacity, or if the window is empty.
    /// Otherwise sleeps until the oldest recorded operation leaves the window
    /// and returns without re-checking.
    pub async fn block_until_allowed(&self, class: RateClass) {
        match self.required_wait(class) {
            Some(wait) => {
                info!(%class, wait_secs = wait.as_secs_f64(), "rate ceiling reached; waiting");
                tokio::time::sleep(wait).await;
            }
            None => debug!(%class, "rate window has capacity"),
        }
    }

    /// Current usage per class, for progress reporting.
    pub fn stats(&self) -> BTreeMap<RateClass, WindowStats> {
        let now = Instant::now();
        let mut windows = self.lock();
        windows
            .iter_mut()
            .map(|(class, window)| {
                window.purge(now);
                let stats = WindowStats {
                    in_window: window.timestamps.len(),
                    ceiling: window.ceiling,
                };
                (*class, stats)
            })
            .collect()
    }
}
