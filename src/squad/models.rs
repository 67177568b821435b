use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::db::{FieldKind, FieldSpec, FieldValue, Record};
use crate::db::convert::{INSTANT_MICROS, UUID_TEXT};

/// One occurrence of the weekly deadline, recorded when the reset runs.
#[derive(Debug, Clone, PartialEq)]
pub struct Deadline {
    pub id: Uuid,
    pub instant: DateTime<Utc>,
}

impl Deadline {
    pub fn at(instant: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            instant,
        }
    }
}

impl Default for Deadline {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4(),
            instant: DateTime::UNIX_EPOCH,
        }
    }
}

static DEADLINE_FIELDS: [FieldSpec<Deadline>; 2] = [
    FieldSpec {
        name: "id",
        kind: FieldKind::Uuid,
        converter: Some(&UUID_TEXT),
        get: |d| FieldValue::Uuid(d.id),
        set: |d, v| {
            d.id = v.into_uuid()?;
            Ok(())
        },
    },
    FieldSpec {
        name: "instant",
        kind: FieldKind::Instant,
        converter: Some(&INSTANT_MICROS),
        get: |d| FieldValue::Instant(d.instant),
        set: |d, v| {
            d.instant = v.into_instant()?;
            Ok(())
        },
    },
];

impl Record for Deadline {
    const TABLE: &'static str = "Deadline";

    fn fields() -> &'static [FieldSpec<Self>] {
        &DEADLINE_FIELDS
    }
}

/// An approved progress report. Belongs to exactly one deadline: the
/// earliest one whose instant is on or after the report's.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub id: Uuid,
    pub member_id: u64,
    pub message_id: u64,
    pub instant: DateTime<Utc>,
    pub deadline_id: Uuid,
}

impl Default for Report {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4(),
            member_id: 0,
            message_id: 0,
            instant: DateTime::UNIX_EPOCH,
            deadline_id: Uuid::nil(),
        }
    }
}

static REPORT_FIELDS: [FieldSpec<Report>; 5] = [
    FieldSpec {
        name: "id",
        kind: FieldKind::Uuid,
        converter: Some(&UUID_TEXT),
        get: |r| FieldValue::Uuid(r.id),
        set: |r, v| {
            r.id = v.into_uuid()?;
            Ok(())
        },
    },
    FieldSpec {
        name: "member_id",
        kind: FieldKind::U64,
        converter: None,
        get: |r| FieldValue::U64(r.member_id),
        set: |r, v| {
            r.member_id = v.into_u64()?;
            Ok(())
        },
    },
    FieldSpec {
        name: "message_id",
        kind: FieldKind::U64,
        converter: None,
        get: |r| FieldValue::U64(r.message_id),
        set: |r, v| {
            r.message_id = v.into_u64()?;
            Ok(())
        },
    },
    FieldSpec {
        name: "instant",
        kind: FieldKind::Instant,
        converter: Some(&INSTANT_MICROS),
        get: |r| FieldValue::Instant(r.instant),
        set: |r, v| {
            r.instant = v.into_instant()?;
            Ok(())
        },
    },
    FieldSpec {
        name: "deadline_id",
        kind: FieldKind::Uuid,
        converter: Some(&UUID_TEXT),
        get: |r| FieldValue::Uuid(r.deadline_id),
        set: |r, v| {
            r.deadline_id = v.into_uuid()?;
            Ok(())
        },
    },
];

impl Record for Report {
    const TABLE: &'static str = "Report";

    fn fields() -> &'static [FieldSpec<Self>] {
        &REPORT_FIELDS
    }
}

/// A reset notice the bot pinned for one deadline, remembered so last
/// week's can be unpinned.
#[derive(Debug, Clone, PartialEq)]
pub struct PinnedNotice {
    pub id: Uuid,
    pub deadline_id: Uuid,
    pub message_id: u64,
}

impl Default for PinnedNotice {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4(),
            deadline_id: Uuid::nil(),
            message_id: 0,
        }
    }
}

static PINNED_NOTICE_FIELDS: [FieldSpec<PinnedNotice>; 3] = [
    FieldSpec {
        name: "id",
        kind: FieldKind::Uuid,
        converter: Some(&UUID_TEXT),
        get: |p| FieldValue::Uuid(p.id),
        set: |p, v| {
            p.id = v.into_uuid()?;
            Ok(())
        },
    },
    FieldSpec {
        name: "deadline_id",
        kind: FieldKind::Uuid,
        converter: Some(&UUID_TEXT),
        get: |p| FieldValue::Uuid(p.deadline_id),
        set: |p, v| {
            p.deadline_id = v.into_uuid()?;
            Ok(())
        },
    },
    FieldSpec {
        name: "message_id",
        kind: FieldKind::U64,
        converter: None,
        get: |p| FieldValue::U64(p.message_id),
        set: |p, v| {
            p.message_id = v.into_u64()?;
            Ok(())
        },
    },
];

impl Record for PinnedNotice {
    const TABLE: &'static str = "PinnedNotice";

    fn fields() -> &'static [FieldSpec<Self>] {
        &PINNED_NOTICE_FIELDS
    }
}

/// One member's standing, derived on demand from their reports against the
/// ordered deadline history. All-zero when the member has never reported.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Participation {
    pub first_report: Option<DateTime<Utc>>,
    pub latest_report: Option<DateTime<Utc>>,
    pub total_reports: u32,
    /// Longest run of consecutive present periods anywhere in the history.
    pub best_streak: u32,
    /// Run of consecutive present periods ending at the latest decided one.
    pub current_streak: u32,
    /// Whole-percent ratio of present periods to counted periods, truncated.
    pub consistency: u32,
    /// When the member's current standing lapses without a new report.
    pub role_expires: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::table_mapping;

    #[test]
    fn record_mappings_resolve_for_every_model() {
        table_mapping::<Deadline>().expect("deadline mapping");
        table_mapping::<Report>().expect("report mapping");
        table_mapping::<PinnedNotice>().expect("pinned notice mapping");
    }

    #[test]
    fn deadline_table_schema_uses_text_ids_and_integer_instants() {
        let mapping = table_mapping::<Deadline>().expect("mapping");
        assert_eq!(
            mapping.create_sql(),
            "CREATE TABLE Deadline (Deadline_pk INTEGER PRIMARY KEY, id TEXT, instant INTEGER)"
        );
    }

    #[test]
    fn fresh_deadlines_get_distinct_ids() {
        let now = Utc::now();
        assert_ne!(Deadline::at(now).id, Deadline::at(now).id);
    }
}
