// Transform Port
// Pure function applied by every worker to each job's value

use crate::domain::TransformError;

/// Transform trait
///
/// Implementations must be pure: the same input always yields the same
/// output, and no state is shared between calls. Workers call `apply`
/// concurrently from several tasks.
///
/// Any `Fn(i64) -> Result<i64, TransformError> + Send + Sync` closure is a
/// transform.
pub trait Transform: Send + Sync {
    fn apply(&self, value: i64) -> Result<i64, TransformError>;
}

impl<F> Transform for F
where
    F: Fn(i64) -> Result<i64, TransformError> + Send + Sync,
{
    fn apply(&self, value: i64) -> Result<i64, TransformError> {
        self(value)
    }
}

/// Multiply by two (the reference transform)
#[derive(Debug, Clone, Copy, Default)]
pub struct Doubling;

impl Transform for Doubling {
    fn apply(&self, value: i64) -> Result<i64, TransformError> {
        value.checked_mul(2).ok_or(TransformError::Overflow(value))
    }
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Mock transform behavior
    #[derive(Debug, Clone)]
    pub enum MockBehavior {
        /// Always double
        Double,
        /// Always fail with message
        Fail(String),
        /// Fail only for this value, double everything else
        FailOn(i64),
        /// Panic with message (for panic isolation testing)
        Panic(String),
        /// Block the calling thread for `delay` on this value, then double
        SlowOn { value: i64, delay: Duration },
    }

    /// Mock transform that counts its calls
    pub struct MockTransform {
        behavior: MockBehavior,
        call_count: AtomicUsize,
    }

    impl MockTransform {
        pub fn new(behavior: MockBehavior) -> Self {
            Self {
                behavior,
                call_count: AtomicUsize::new(0),
            }
        }

        pub fn new_double() -> Self {
            Self::new(MockBehavior::Double)
        }

        pub fn new_fail(message: impl Into<String>) -> Self {
            Self::new(MockBehavior::Fail(message.into()))
        }

        pub fn new_panic_inducing(message: impl Into<String>) -> Self {
            Self::new(MockBehavior::Panic(message.into()))
        }

        pub fn call_count(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }
    }

    impl Transform for MockTransform {
        fn apply(&self, value: i64) -> Result<i64, TransformError> {
            self.call_count.fetch_add(1, Ordering::SeqCst);

            match &self.behavior {
                MockBehavior::Double => Doubling.apply(value),
                MockBehavior::Fail(msg) => Err(TransformError::Rejected(msg.clone())),
                MockBehavior::FailOn(bad) if *bad == value => {
                    Err(TransformError::Rejected(format!("value {} is not accepted", value)))
                }
                MockBehavior::FailOn(_) => Doubling.apply(value),
                MockBehavior::Panic(msg) => {
                    panic!("{}", msg); // Actually panic for panic isolation testing
                }
                MockBehavior::SlowOn { value: slow, delay } => {
                    if *slow == value {
                        std::thread::sleep(*delay);
                    }
                    Doubling.apply(value)
                }
            }
        }
    }
}
