/// Runs a cleanup function when dropped.
///
/// The CLI holds one of these so its shells are shut down both on a normal
/// return and while unwinding from a panic.
///
/// # Examples
///
/// ```
/// use shellmux::utils::guard::CleanupGuard;
///
/// let _guard = CleanupGuard::new(|| println!("cleanup"));
/// // "cleanup" is printed when _guard goes out of scope
/// ```
pub struct CleanupGuard<F: FnOnce()> {
    on_drop: Option<F>,
}

impl<F: FnOnce()> CleanupGuard<F> {
    pub fn new(f: F) -> Self {
        Self { on_drop: Some(f) }
    }
}

impl<F: FnOnce()> Drop for CleanupGuard<F> {
    fn drop(&mut self) {
        if let Some(f) = self.on_drop.take() {
            f()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::panic;
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;

    #[test]
    fn test_runs_on_scope_exit() {
        let ran = Cell::new(false);
        {
            let _guard = CleanupGuard::new(|| ran.set(true));
            assert!(!ran.get());
        }
        assert!(ran.get());
    }

    #[test]
    fn test_runs_on_panic() {
        let ran = AtomicBool::new(false);
        let outcome = panic::catch_unwind(panic::AssertUnwindSafe(|| {
            let _guard = CleanupGuard::new(|| ran.store(true, Ordering::SeqCst));
            panic!("boom");
        }));
        assert!(outcome.is_err());
        assert!(ran.load(Ordering::SeqCst));
    }
}
