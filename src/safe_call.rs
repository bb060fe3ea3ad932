//! The boundary between user handlers and the resolution protocol.
//!
//! A handler either returns `Ok`, returns `Err`, or panics. All three come out
//! of [`safe_call`] as a plain `Result`, so nothing unwinds into a worker.

use crate::Error;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::warn;

/// Run `f`, turning a panic into `Err(E::from(Error::Panicked(..)))`.
///
/// # Examples
///
/// ```
/// use promise_tree::safe_call;
///
/// let ok: Result<i32, String> = safe_call(|| Ok(1));
/// assert_eq!(ok, Ok(1));
///
/// let caught: Result<i32, String> = safe_call(|| panic!("boom"));
/// assert_eq!(caught, Err("handler panicked: boom".to_string()));
/// ```
pub fn safe_call<T, E, F>(f: F) -> Result<T, E>
where
    F: FnOnce() -> Result<T, E>,
    E: From<Error>,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(outcome) => outcome,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            warn!(panic = %message, "handler panicked, rejecting");
            Err(E::from(Error::Panicked(message)))
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_call_passes_results_through() {
        let ok: Result<&str, String> = safe_call(|| Ok("fine"));
        assert_eq!(ok, Ok("fine"));
        let err: Result<&str, String> = safe_call(|| Err("nope".to_string()));
        assert_eq!(err, Err("nope".to_string()));
    }

    #[test]
    fn test_safe_call_captures_formatted_panic() {
        let code = 7;
        let caught: Result<(), Error> = safe_call(|| panic!("exit code {}", code));
        assert_eq!(caught, Err(Error::Panicked("exit code 7".into())));
    }

    #[test]
    fn test_safe_call_captures_opaque_panic() {
        let caught: Result<(), Error> = safe_call(|| std::panic::panic_any(42_u8));
        assert_eq!(caught, Err(Error::Panicked("unknown panic".into())));
    }
}
