use crate::error::{ExtractError, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Ctrl+C state shared by every clone. The first interrupt asks the batch to
/// stop after the current scan; the second exits with status 130.
#[derive(Clone)]
pub struct GracefulShutdown {
    interrupts: Arc<AtomicUsize>,
}

impl GracefulShutdown {
    pub fn new() -> Result<Self> {
        let shutdown = Self::new_for_test();
        let interrupts = Arc::clone(&shutdown.interrupts);

        ctrlc::set_handler(move || {
            if interrupts.fetch_add(1, Ordering::SeqCst) == 0 {
                eprintln!("\nStopping after the current scan... (press Ctrl+C again to force exit)");
            } else {
                eprintln!("\nForce stopping...");
                std::process::exit(130);
            }
        })
        .map_err(|e| ExtractError::Config {
            message: format!("Failed to set signal handler: {}", e),
        })?;

        Ok(shutdown)
    }

    /// Without a signal handler; `ctrlc` allows only one per process.
    pub fn new_for_test() -> Self {
        Self {
            interrupts: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.interrupts.load(Ordering::SeqCst) == 0
    }

    pub fn check_shutdown(&self) -> Result<()> {
        if self.is_running() {
            Ok(())
        } else {
            Err(ExtractError::Cancelled)
        }
    }

    pub fn request_shutdown(&self) {
        self.interrupts.fetch_max(1, Ordering::SeqCst);
    }

    /// Runs `operation` unless a stop was already requested. Once started it
    /// runs to completion and its result stands.
    pub fn with_shutdown_check<F, R>(&self, operation: F) -> Result<R>
    where
        F: FnOnce() -> Result<R>,
    {
        self.check_shutdown()?;
        operation()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_shutdown() {
        let shutdown = GracefulShutdown::new_for_test();
        assert!(shutdown.is_running());
        assert!(shutdown.check_shutdown().is_ok());

        shutdown.request_shutdown();
        shutdown.request_shutdown();
        assert!(!shutdown.is_running());
        assert!(matches!(shutdown.check_shutdown(), Err(ExtractError::Cancelled)));
        assert_eq!(shutdown.interrupts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_clones_share_state() {
        let shutdown = GracefulShutdown::new_for_test();
        let worker_view = shutdown.clone();

        shutdown.request_shutdown();
        assert!(!worker_view.is_running());
    }

    #[test]
    fn test_with_shutdown_check() {
        let shutdown = GracefulShutdown::new_for_test();
        assert_eq!(shutdown.with_shutdown_check(|| Ok(42)).unwrap(), 42);

        // A stop during the operation does not discard finished work.
        let during = shutdown.with_shutdown_check(|| {
            shutdown.request_shutdown();
            Ok(7)
        });
        assert_eq!(during.unwrap(), 7);

        let after = shutdown.with_shutdown_check(|| Ok(1));
        assert!(matches!(after, Err(ExtractError::Cancelled)));
    }
}
