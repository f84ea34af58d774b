//! Incremental fetch controller
//!
//! The row limit grows as the viewport approaches the end of the fetched
//! rows. Increases are debounced: the first qualifying row access schedules
//! one increase and later accesses are absorbed until it fires.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchConfig {
    /// Row limit at the start of every filter/sort/view session
    pub initial_rows: usize,
    /// Rows added per increase
    pub increment: usize,
    /// Distance from the limit that triggers an increase
    pub prefetch_margin: usize,
    pub debounce: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            initial_rows: 100,
            increment: 100,
            prefetch_margin: 20,
            debounce: Duration::from_millis(150),
        }
    }
}

/// Row limit of the current session.
///
/// `generation` changes on every reset so a debounced increase scheduled in
/// an earlier session is recognized and dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchWindow {
    limit: usize,
    generation: u64,
    increase_pending: bool,
}

impl FetchWindow {
    pub fn new(config: &FetchConfig) -> Self {
        Self {
            limit: config.initial_rows,
            generation: 0,
            increase_pending: false,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn increase_pending(&self) -> bool {
        self.increase_pending
    }

    /// Start a new session at the initial limit
    pub fn reset(&mut self, config: &FetchConfig) {
        self.limit = config.initial_rows;
        self.generation += 1;
        self.increase_pending = false;
    }

    /// Record a read of row `index`. Returns the generation to schedule an
    /// increase for, or `None` when no increase is needed or one is already
    /// scheduled.
    pub fn on_row_access(&mut self, config: &FetchConfig, index: usize) -> Option<u64> {
        if self.increase_pending || self.limit >= index.saturating_add(config.prefetch_margin) {
            return None;
        }
        self.increase_pending = true;
        Some(self.generation)
    }

    /// Apply a scheduled increase. Returns false for increases scheduled in
    /// an earlier session.
    pub fn increase(&mut self, config: &FetchConfig, generation: u64) -> bool {
        if generation != self.generation {
            return false;
        }
        self.increase_pending = false;
        self.limit += config.increment;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_near_limit_schedules_once() {
        let config = FetchConfig::default();
        let mut window = FetchWindow::new(&config);

        assert_eq!(window.on_row_access(&config, 50), None);
        assert_eq!(window.on_row_access(&config, 80), None);
        assert_eq!(window.on_row_access(&config, 81), Some(0));
        assert_eq!(window.on_row_access(&config, 90), None);
        assert_eq!(window.on_row_access(&config, 99), None);

        assert!(window.increase(&config, 0));
        assert_eq!(window.limit(), 200);
        assert!(!window.increase_pending());
    }

    #[test]
    fn test_reset_drops_scheduled_increase() {
        let config = FetchConfig::default();
        let mut window = FetchWindow::new(&config);
        let generation = window.on_row_access(&config, 95).unwrap();
        window.increase(&config, generation);
        let generation = window.on_row_access(&config, 195).unwrap();

        window.reset(&config);
        assert_eq!(window.limit(), 100);
        assert!(!window.increase(&config, generation));
        assert_eq!(window.limit(), 100);
    }

    #[test]
    fn test_limit_never_decreases_within_session() {
        let config = FetchConfig {
            initial_rows: 10,
            increment: 5,
            prefetch_margin: 2,
            debounce: Duration::ZERO,
        };
        let mut window = FetchWindow::new(&config);
        let mut previous = window.limit();
        for index in 0..100 {
            if let Some(generation) = window.on_row_access(&config, index) {
                window.increase(&config, generation);
            }
            assert!(window.limit() >= previous);
            previous = window.limit();
        }
        assert!(window.limit() >= 100);
    }
}
