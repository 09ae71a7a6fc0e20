//! Typed ID definitions.

use crate::define_id;

define_id!(
    /// Local identity of one character assignment inside a schedule cell.
    ScheduleId,
    "sch"
);

define_id!(
    /// Identity of one client session, used to correlate log lines.
    SessionId,
    "ses"
);

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_schedule_id_display_has_prefix() {
        let id = ScheduleId::new();
        assert!(id.to_string().starts_with("sch_"));
    }

    #[test]
    fn test_parse_rejects_session_id() {
        let session = SessionId::new().to_string();
        assert_eq!(
            ScheduleId::parse(&session),
            Err(crate::IdError::WrongKind {
                expected: "sch",
                found: "ses".into()
            })
        );
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(ScheduleId::parse(""), Err(crate::IdError::Empty));
        assert!(matches!(
            ScheduleId::parse("sch01HV4Z2WQXKJNM8GPQY6VBKC3D"),
            Err(crate::IdError::Malformed { .. })
        ));
        let err = ScheduleId::parse("sch_not-a-ulid").unwrap_err();
        assert!(err.to_string().starts_with("malformed id 'sch_not-a-ulid'"));
    }

    #[test]
    fn test_fresh_ids_are_distinct() {
        let a = ScheduleId::new();
        let b = ScheduleId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn test_serde_as_string() {
        let id = ScheduleId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
        let back: ScheduleId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    proptest! {
        #[test]
        fn prop_any_ulid_survives_display(raw in any::<u128>()) {
            let id = ScheduleId::from_ulid(crate::Ulid(raw));
            let parsed: ScheduleId = id.to_string().parse().unwrap();
            prop_assert_eq!(parsed, id);
        }
    }
}
