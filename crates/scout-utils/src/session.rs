use once_cell::sync::Lazy;
use uuid::Uuid;

static SESSION_ID: Lazy<String> = Lazy::new(|| Uuid::new_v4().to_string());

/// Process-stable session identifier, generated once per process.
///
/// Every audit event emitted by this process carries the same value so
/// that downstream cost reports can group by run.
#[must_use]
pub fn session_id() -> &'static str {
    &SESSION_ID
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_is_stable_within_process() {
        assert_eq!(session_id(), session_id());
    }

    #[test]
    fn session_id_is_a_uuid() {
        assert!(Uuid::parse_str(session_id()).is_ok());
    }
}
