//! Restricted-thread guard
//!
//! A thread that renders or handles user input marks itself restricted.
//! Blocking mutations issued from such a thread fail immediately instead of
//! stalling it, unless the store was opened with
//! `allow_restricted_thread_queries`.

use std::cell::Cell;

thread_local! {
    static RESTRICTED: Cell<bool> = const { Cell::new(false) };
}

/// Mark the calling thread as interactive
pub fn restrict_current_thread() {
    RESTRICTED.with(|r| r.set(true));
}

/// Clear the mark set by `restrict_current_thread`
pub fn release_current_thread() {
    RESTRICTED.with(|r| r.set(false));
}

pub fn is_current_thread_restricted() -> bool {
    RESTRICTED.with(Cell::get)
}

pub(crate) fn ensure_unrestricted(operation: &'static str, allowed: bool) -> crate::Result<()> {
    if !allowed && is_current_thread_restricted() {
        tracing::warn!("Refusing {} on restricted thread", operation);
        return Err(crate::Error::RestrictedThread { operation });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_is_per_thread() {
        restrict_current_thread();
        assert!(is_current_thread_restricted());

        let other = std::thread::spawn(is_current_thread_restricted).join().unwrap();
        assert!(!other);

        release_current_thread();
        assert!(!is_current_thread_restricted());
    }

    #[test]
    fn test_ensure_unrestricted() {
        restrict_current_thread();
        assert!(matches!(
            ensure_unrestricted("insert", false),
            Err(crate::Error::RestrictedThread { operation: "insert" })
        ));
        assert!(ensure_unrestricted("insert", true).is_ok());
        release_current_thread();
        assert!(ensure_unrestricted("insert", false).is_ok());
    }
}
