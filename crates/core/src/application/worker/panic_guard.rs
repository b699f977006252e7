// Panic isolation for transform calls
use std::any::Any;
use tracing::error;

/// Result of a panic-guarded execution
#[derive(Debug)]
pub enum PanicGuardResult<T> {
    /// Execution completed
    Success(T),
    /// Execution panicked
    Panicked(String),
    /// Blocking task was cancelled (runtime shutting down)
    Aborted(String),
}

/// Run a CPU-bound closure on the blocking pool with panic isolation.
///
/// The calling task is suspended (not its thread) while the closure runs,
/// so other workers on the same runtime thread keep making progress. A
/// panic inside the closure is caught by the runtime and returned as
/// `PanicGuardResult::Panicked`.
///
/// # Example
/// ```text
/// let result = execute_guarded(|| panic!("boom")).await;
/// assert!(matches!(result, PanicGuardResult::Panicked(_)));
/// ```
pub async fn execute_guarded<F, T>(f: F) -> PanicGuardResult<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => PanicGuardResult::Success(result),
        Err(join_err) if join_err.is_panic() => {
            let panic_msg = panic_message(join_err.into_panic());
            error!(panic_msg = %panic_msg, "Transform panicked");
            PanicGuardResult::Panicked(panic_msg)
        }
        Err(join_err) => PanicGuardResult::Aborted(join_err.to_string()),
    }
}

/// Extract the message from a panic payload
pub fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_success_passes_through() {
        match execute_guarded(|| 40 + 2).await {
            PanicGuardResult::Success(v) => assert_eq!(v, 42),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_str_panic_message_captured() {
        let result: PanicGuardResult<()> = execute_guarded(|| panic!("static message")).await;
        match result {
            PanicGuardResult::Panicked(msg) => assert_eq!(msg, "static message"),
            other => panic!("expected panic, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_formatted_panic_message_captured() {
        let value = 7;
        let result: PanicGuardResult<()> =
            execute_guarded(move || panic!("bad value {}", value)).await;
        match result {
            PanicGuardResult::Panicked(msg) => assert_eq!(msg, "bad value 7"),
            other => panic!("expected panic, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_payload() {
        assert_eq!(panic_message(Box::new(17u8)), "Unknown panic");
    }
}
