//! Correlation metadata for repofetch events.

use std::sync::OnceLock;
use uuid::Uuid;

/// Global correlation ID for the current session.
static CORRELATION_ID: OnceLock<Uuid> = OnceLock::new();

/// Get or create a correlation ID for the current session.
///
/// This returns the same ID throughout the lifetime of the process,
/// allowing all events of one run to be correlated together.
#[must_use]
pub fn correlation_id() -> Uuid {
    *CORRELATION_ID.get_or_init(Uuid::new_v4)
}

/// Set the correlation ID for the current session.
///
/// This can only be called once; subsequent calls will be ignored.
/// Returns `true` if the ID was set, `false` if it was already set.
pub fn set_correlation_id(id: Uuid) -> bool {
    CORRELATION_ID.set(id).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_correlation_id_consistency() {
        let id1 = correlation_id();
        let id2 = correlation_id();
        assert_eq!(id1, id2);
        assert!(!id1.is_nil());
    }

    #[test]
    fn test_set_correlation_id_after_init() {
        let _ = correlation_id();
        assert!(!set_correlation_id(Uuid::new_v4()));
    }
}
