//! Progress-callback trait for per-page processing events.
//!
//! Inject an [`Arc<dyn ProcessingProgressCallback>`] via
//! [`crate::config::ProcessingConfigBuilder::progress_callback`] to receive
//! events as the orchestrator works through a document.
//!
//! # Example
//!
//! ```rust
//! use scanrefine::{ProcessingProgressCallback, ProcessingConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct RetryCounter {
//!     retries: AtomicUsize,
//! }
//!
//! impl ProcessingProgressCallback for RetryCounter {
//!     fn on_attempt_scored(&self, _page: usize, attempt: u32, _score: f32, _acceptable: bool) {
//!         if attempt > 0 {
//!             self.retries.fetch_add(1, Ordering::SeqCst);
//!         }
//!     }
//! }
//!
//! let counter = Arc::new(RetryCounter { retries: AtomicUsize::new(0) });
//!
//! let config = ProcessingConfig::builder()
//!     .progress_callback(counter as Arc<dyn ProcessingProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the orchestrator as it processes each page.
///
/// Pages run concurrently on blocking worker threads, so every method may
/// be called from several threads at once. Implementations must protect
/// shared mutable state (`Mutex`, atomics). All methods default to no-ops.
pub trait ProcessingProgressCallback: Send + Sync {
    /// Called once, after rasterisation, with the number of selected pages.
    fn on_document_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called before the first attempt on a page.
    ///
    /// # Arguments
    /// * `page_num`: 1-indexed page number
    /// * `total_pages`: pages selected for processing
    fn on_page_start(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// Called after each scored attempt (0 is the first try).
    fn on_attempt_scored(&self, page_num: usize, attempt: u32, score: f32, acceptable: bool) {
        let _ = (page_num, attempt, score, acceptable);
    }

    /// Called when a page finishes with recognised text.
    ///
    /// # Arguments
    /// * `score`: quality of the kept attempt
    /// * `text_len`: byte length of the page text
    fn on_page_complete(&self, page_num: usize, total_pages: usize, score: f32, text_len: usize) {
        let _ = (page_num, total_pages, score, text_len);
    }

    /// Called when a page ends as a placeholder.
    fn on_page_error(&self, page_num: usize, total_pages: usize, error: String) {
        let _ = (page_num, total_pages, error);
    }

    /// Called once after every page has been attempted.
    ///
    /// # Arguments
    /// * `success_count`: pages that ended with recognised text
    fn on_document_complete(&self, total_pages: usize, success_count: usize) {
        let _ = (total_pages, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ProcessingProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ProcessingConfig`].
pub type ProgressCallback = Arc<dyn ProcessingProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        starts: AtomicUsize,
        attempts: AtomicUsize,
        completes: AtomicUsize,
        errors: AtomicUsize,
        succeeded: AtomicUsize,
    }

    impl ProcessingProgressCallback for TrackingCallback {
        fn on_page_start(&self, _page_num: usize, _total_pages: usize) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_attempt_scored(&self, _page: usize, _attempt: u32, _score: f32, _ok: bool) {
            self.attempts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_page_complete(&self, _page: usize, _total: usize, _score: f32, _len: usize) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_page_error(&self, _page_num: usize, _total_pages: usize, _error: String) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }

        fn on_document_complete(&self, _total_pages: usize, success_count: usize) {
            self.succeeded.store(success_count, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_document_start(5);
        cb.on_page_start(1, 5);
        cb.on_attempt_scored(1, 0, 42.0, false);
        cb.on_page_complete(1, 5, 88.0, 42);
        cb.on_page_error(2, 5, "some error".into());
        cb.on_document_complete(5, 4);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();

        tracker.on_page_start(1, 2);
        tracker.on_attempt_scored(1, 0, 91.0, true);
        tracker.on_page_complete(1, 2, 91.0, 12);
        tracker.on_page_start(2, 2);
        tracker.on_attempt_scored(2, 0, 0.0, false);
        tracker.on_attempt_scored(2, 1, 0.0, false);
        tracker.on_page_error(2, 2, "no text".into());
        tracker.on_document_complete(2, 1);

        assert_eq!(tracker.starts.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.attempts.load(Ordering::SeqCst), 3);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.succeeded.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_document_start(10);
        cb.on_page_start(1, 10);
    }
}
