//! Hard-coded required datatypes

use crate::core::transform::declared_fields;
use crate::domain::{DatatypeDescriptor, DatatypeName, Result, TableType, TransformKind};

/// Per-user, per-course visit summary computed from the standard log
pub const TRACKING_LOG_QUERY: &str = "SELECT MIN(l.id) AS id, l.userid, l.courseid, \
COUNT(*) AS visits, MAX(l.timecreated) AS lastaccess \
FROM {logstore_standard_log} l \
WHERE l.courseid > 1 AND l.userid > 0 \
GROUP BY l.userid, l.courseid";

struct Entry {
    name: &'static str,
    table: &'static str,
    transform: TransformKind,
    timestamp: Option<&'static str>,
    filter_by_id: bool,
    uses_id_diff: bool,
}

const REQUIRED: &[Entry] = &[
    Entry { name: "users", table: "user", transform: TransformKind::User, timestamp: Some("timemodified"), filter_by_id: false, uses_id_diff: false },
    Entry { name: "categories", table: "course_categories", transform: TransformKind::Category, timestamp: Some("timemodified"), filter_by_id: false, uses_id_diff: false },
    Entry { name: "courses", table: "course", transform: TransformKind::Course, timestamp: Some("timemodified"), filter_by_id: false, uses_id_diff: false },
    Entry { name: "enrolments", table: "user_enrolments", transform: TransformKind::Enrolment, timestamp: Some("timemodified"), filter_by_id: false, uses_id_diff: false },
    Entry { name: "roleassignments", table: "role_assignments", transform: TransformKind::RoleAssignment, timestamp: Some("timemodified"), filter_by_id: false, uses_id_diff: false },
    Entry { name: "coursegroups", table: "groups", transform: TransformKind::Group, timestamp: Some("timemodified"), filter_by_id: false, uses_id_diff: false },
    Entry { name: "coursegroupmembers", table: "groups_members", transform: TransformKind::GroupMember, timestamp: None, filter_by_id: false, uses_id_diff: true },
    Entry { name: "activities", table: "course_modules", transform: TransformKind::Activity, timestamp: None, filter_by_id: true, uses_id_diff: true },
    Entry { name: "gradeitems", table: "grade_items", transform: TransformKind::GradeItem, timestamp: Some("timemodified"), filter_by_id: false, uses_id_diff: false },
    Entry { name: "grades", table: "grade_grades", transform: TransformKind::Grade, timestamp: Some("timemodified"), filter_by_id: false, uses_id_diff: false },
    Entry { name: "forumposts", table: "forum_posts", transform: TransformKind::ForumPost, timestamp: Some("modified"), filter_by_id: false, uses_id_diff: false },
    Entry { name: "quizattempts", table: "quiz_attempts", transform: TransformKind::QuizAttempt, timestamp: Some("timemodified"), filter_by_id: false, uses_id_diff: false },
];

/// Builds the required descriptors in catalogue order
pub fn required_datatypes() -> Result<Vec<DatatypeDescriptor>> {
    let mut descriptors = Vec::with_capacity(REQUIRED.len() + 1);

    for entry in REQUIRED {
        let mut builder = DatatypeDescriptor::builder(
            DatatypeName::new(entry.name).map_err(crate::domain::HarvestError::Configuration)?,
            entry.transform,
        )
        .table_type(TableType::Required)
        .table(entry.table)
        .filter_by_id(entry.filter_by_id)
        .uses_id_diff(entry.uses_id_diff)
        .fields(declared_fields(entry.transform));
        if let Some(field) = entry.timestamp {
            builder = builder.change_tracking_field(field);
        }
        descriptors.push(builder.build());
    }

    descriptors.push(
        DatatypeDescriptor::builder(
            DatatypeName::new("trackinglog").map_err(crate::domain::HarvestError::Configuration)?,
            TransformKind::TrackingLog,
        )
        .table_type(TableType::Required)
        .query(TRACKING_LOG_QUERY)
        .rewritable(true)
        .fields(declared_fields(TransformKind::TrackingLog))
        .build(),
    );

    Ok(descriptors)
}

/// Source tables read by the required datatypes, including the log table
/// behind computed queries
pub fn required_tables() -> Vec<&'static str> {
    let mut tables: Vec<&'static str> = REQUIRED.iter().map(|e| e.table).collect();
    tables.push(crate::core::registry::config::DEFAULT_LOG_TABLE);
    tables
}
