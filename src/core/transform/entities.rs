//! Entity transforms
//!
//! Every [`TransformKind`] maps onto a static list of output fields. A field
//! reads one source column or derives its value from the whole row.
//! [`TransformKind::Generic`] instead passes through the descriptor's
//! introspected fields.

use crate::domain::{
    DatatypeDescriptor, FieldDef, FieldKind, HarvestError, Result, SourceRow, TransformKind,
};
use serde_json::{Map, Value};

type Derive = fn(&SourceRow) -> Option<Value>;

/// Where an output field gets its value
#[derive(Clone)]
pub enum FieldSource {
    /// Copied from the named column
    Column(String),
    /// Computed from the row
    Derived(Derive),
}

impl std::fmt::Debug for FieldSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Column(column) => write!(f, "Column({column})"),
            Self::Derived(_) => f.write_str("Derived"),
        }
    }
}

struct FieldSpec {
    name: &'static str,
    kind: FieldKind,
    derive: Option<Derive>,
}

const fn int(name: &'static str) -> FieldSpec {
    FieldSpec { name, kind: FieldKind::Integer, derive: None }
}

const fn num(name: &'static str) -> FieldSpec {
    FieldSpec { name, kind: FieldKind::Number, derive: None }
}

const fn text(name: &'static str) -> FieldSpec {
    FieldSpec { name, kind: FieldKind::Text, derive: None }
}

const fn flag(name: &'static str) -> FieldSpec {
    FieldSpec { name, kind: FieldKind::Boolean, derive: None }
}

const fn derived(name: &'static str, kind: FieldKind, derive: Derive) -> FieldSpec {
    FieldSpec { name, kind, derive: Some(derive) }
}

fn full_name(row: &SourceRow) -> Option<Value> {
    let first = row.get_str("firstname").unwrap_or_default().trim();
    let last = row.get_str("lastname").unwrap_or_default().trim();
    let joined = format!("{first} {last}");
    let joined = joined.trim();
    if joined.is_empty() {
        None
    } else {
        Some(Value::from(joined))
    }
}

/// Masks the host part of an address: `10.1.2.3` becomes `10.1.2.0`
pub fn redact_ip(ip: &str) -> String {
    if let Some((network, _)) = ip.rsplit_once('.') {
        if network.split('.').count() == 3 {
            return format!("{network}.0");
        }
    }
    if let Some((network, _)) = ip.rsplit_once(':') {
        return format!("{network}:0");
    }
    String::new()
}

fn redacted_ip(row: &SourceRow) -> Option<Value> {
    row.get_str("ip")
        .filter(|ip| !ip.is_empty())
        .map(|ip| Value::from(redact_ip(ip)))
}

fn log_crud(row: &SourceRow) -> Option<Value> {
    row.values.get("crud").cloned()
}

const USER: &[FieldSpec] = &[
    int("id"),
    text("username"),
    text("auth"),
    text("firstname"),
    text("lastname"),
    derived("fullname", FieldKind::Text, full_name),
    text("email"),
    text("idnumber"),
    text("institution"),
    text("department"),
    text("city"),
    text("country"),
    text("lang"),
    text("timezone"),
    flag("confirmed"),
    flag("suspended"),
    flag("deleted"),
    int("firstaccess"),
    int("lastaccess"),
    int("lastlogin"),
    int("timecreated"),
    int("timemodified"),
];

const CATEGORY: &[FieldSpec] = &[
    int("id"),
    text("name"),
    text("idnumber"),
    text("description"),
    int("parent"),
    int("sortorder"),
    int("coursecount"),
    flag("visible"),
    int("depth"),
    text("path"),
    int("timemodified"),
];

const COURSE: &[FieldSpec] = &[
    int("id"),
    int("category"),
    text("fullname"),
    text("shortname"),
    text("idnumber"),
    text("summary"),
    text("format"),
    int("startdate"),
    int("enddate"),
    flag("visible"),
    int("timecreated"),
    int("timemodified"),
];

const ENROLMENT: &[FieldSpec] = &[
    int("id"),
    int("enrolid"),
    int("userid"),
    int("status"),
    int("timestart"),
    int("timeend"),
    int("timecreated"),
    int("timemodified"),
];

const ROLE_ASSIGNMENT: &[FieldSpec] = &[
    int("id"),
    int("roleid"),
    int("contextid"),
    int("userid"),
    text("component"),
    int("itemid"),
    int("timemodified"),
];

const GROUP: &[FieldSpec] = &[
    int("id"),
    int("courseid"),
    text("idnumber"),
    text("name"),
    text("description"),
    int("timecreated"),
    int("timemodified"),
];

const GROUP_MEMBER: &[FieldSpec] = &[
    int("id"),
    int("groupid"),
    int("userid"),
    text("component"),
    int("timeadded"),
];

const ACTIVITY: &[FieldSpec] = &[
    int("id"),
    int("course"),
    int("module"),
    int("instance"),
    int("section"),
    text("idnumber"),
    int("added"),
    flag("visible"),
    int("completion"),
    flag("deletioninprogress"),
];

const GRADE_ITEM: &[FieldSpec] = &[
    int("id"),
    int("courseid"),
    int("categoryid"),
    text("itemname"),
    text("itemtype"),
    text("itemmodule"),
    int("iteminstance"),
    num("grademax"),
    num("grademin"),
    num("gradepass"),
    int("hidden"),
    int("timecreated"),
    int("timemodified"),
];

const GRADE: &[FieldSpec] = &[
    int("id"),
    int("itemid"),
    int("userid"),
    num("rawgrade"),
    num("finalgrade"),
    int("hidden"),
    int("locked"),
    int("overridden"),
    int("timecreated"),
    int("timemodified"),
];

const FORUM_POST: &[FieldSpec] = &[
    int("id"),
    int("discussion"),
    int("parent"),
    int("userid"),
    text("subject"),
    text("message"),
    int("messageformat"),
    int("wordcount"),
    int("created"),
    int("modified"),
];

const QUIZ_ATTEMPT: &[FieldSpec] = &[
    int("id"),
    int("quiz"),
    int("userid"),
    int("attempt"),
    int("uniqueid"),
    text("state"),
    num("sumgrades"),
    int("timestart"),
    int("timefinish"),
    int("timemodified"),
];

const TRACKING_LOG: &[FieldSpec] = &[
    int("id"),
    int("userid"),
    int("courseid"),
    int("visits"),
    int("lastaccess"),
];

const LOG_EVENT: &[FieldSpec] = &[
    int("id"),
    text("eventname"),
    text("component"),
    text("action"),
    text("target"),
    text("objecttable"),
    int("objectid"),
    derived("eventcrud", FieldKind::Text, log_crud),
    int("edulevel"),
    int("contextid"),
    int("contextlevel"),
    int("contextinstanceid"),
    int("userid"),
    int("courseid"),
    int("relateduserid"),
    text("origin"),
    derived("ip", FieldKind::Text, redacted_ip),
    int("timecreated"),
];

fn specs(kind: TransformKind) -> &'static [FieldSpec] {
    match kind {
        TransformKind::User => USER,
        TransformKind::Category => CATEGORY,
        TransformKind::Course => COURSE,
        TransformKind::Enrolment => ENROLMENT,
        TransformKind::RoleAssignment => ROLE_ASSIGNMENT,
        TransformKind::Group => GROUP,
        TransformKind::GroupMember => GROUP_MEMBER,
        TransformKind::Activity => ACTIVITY,
        TransformKind::GradeItem => GRADE_ITEM,
        TransformKind::Grade => GRADE,
        TransformKind::ForumPost => FORUM_POST,
        TransformKind::QuizAttempt => QUIZ_ATTEMPT,
        TransformKind::TrackingLog => TRACKING_LOG,
        TransformKind::LogEvent => LOG_EVENT,
        TransformKind::Generic => &[],
    }
}

/// Declared output fields of a static transform (empty for `Generic`)
pub fn declared_fields(kind: TransformKind) -> Vec<FieldDef> {
    specs(kind)
        .iter()
        .map(|spec| FieldDef::new(spec.name, spec.kind))
        .collect()
}

/// One resolved output field
#[derive(Debug, Clone)]
pub struct OutputField {
    pub name: String,
    pub kind: FieldKind,
    pub source: FieldSource,
}

/// Row-to-record transform resolved for one datatype
#[derive(Debug, Clone)]
pub struct EntityTransform {
    datatype: String,
    fields: Vec<OutputField>,
    max_text_length: usize,
}

impl EntityTransform {
    /// Resolves the transform of a descriptor
    ///
    /// Static kinds use their built-in field list; `Generic` reads each of the
    /// descriptor's declared fields from the column of the same name.
    pub fn for_descriptor(descriptor: &DatatypeDescriptor, max_text_length: usize) -> Self {
        let fields = match descriptor.transform {
            TransformKind::Generic => descriptor
                .fields
                .iter()
                .map(|field| OutputField {
                    name: field.name.clone(),
                    kind: field.kind,
                    source: FieldSource::Column(field.name.clone()),
                })
                .collect(),
            kind => specs(kind)
                .iter()
                .map(|spec| OutputField {
                    name: spec.name.to_string(),
                    kind: spec.kind,
                    source: match spec.derive {
                        Some(derive) => FieldSource::Derived(derive),
                        None => FieldSource::Column(spec.name.to_string()),
                    },
                })
                .collect(),
        };

        Self {
            datatype: descriptor.name.to_string(),
            fields,
            max_text_length,
        }
    }

    pub fn fields(&self) -> &[OutputField] {
        &self.fields
    }

    /// Turns one source row into the declared field values
    ///
    /// # Errors
    ///
    /// Returns [`HarvestError::Transform`] when a column is missing or holds a
    /// value that cannot be read as the declared kind.
    pub fn apply(&self, row: &SourceRow) -> Result<Map<String, Value>> {
        let mut values = Map::with_capacity(self.fields.len());

        for field in &self.fields {
            let raw = match &field.source {
                FieldSource::Column(column) => row.values.get(column).cloned().ok_or_else(|| {
                    HarvestError::transform(&self.datatype, row.id, format!("missing column '{column}'"))
                })?,
                FieldSource::Derived(derive) => derive(row).unwrap_or(Value::Null),
            };

            let value = coerce(raw, field.kind, self.max_text_length).map_err(|message| {
                HarvestError::transform(&self.datatype, row.id, format!("field '{}': {message}", field.name))
            })?;
            values.insert(field.name.clone(), value);
        }

        Ok(values)
    }
}

/// Truncates to at most `max` characters on a char boundary
pub fn truncate_text(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((byte_index, _)) => text[..byte_index].to_string(),
        None => text.to_string(),
    }
}

fn coerce(value: Value, kind: FieldKind, max_text_length: usize) -> std::result::Result<Value, String> {
    if value.is_null() {
        return Ok(Value::Null);
    }

    match kind {
        FieldKind::Integer => match &value {
            Value::Number(n) if n.is_i64() => Ok(value),
            Value::Number(n) => n
                .as_f64()
                .filter(|f| f.fract() == 0.0)
                .map(|f| Value::from(f as i64))
                .ok_or_else(|| format!("expected integer, got {value}")),
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| format!("expected integer, got '{s}'")),
            Value::Bool(b) => Ok(Value::from(i64::from(*b))),
            other => Err(format!("expected integer, got {other}")),
        },
        FieldKind::Number => match &value {
            Value::Number(n) => n
                .as_f64()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| format!("expected number, got {value}")),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| format!("expected number, got '{s}'")),
            other => Err(format!("expected number, got {other}")),
        },
        FieldKind::Text => match value {
            Value::String(s) => Ok(Value::from(truncate_text(&s, max_text_length))),
            Value::Number(n) => Ok(Value::from(n.to_string())),
            Value::Bool(b) => Ok(Value::from(b.to_string())),
            other => Ok(Value::from(truncate_text(&other.to_string(), max_text_length))),
        },
        FieldKind::Boolean => match &value {
            Value::Bool(_) => Ok(value),
            Value::Number(n) => Ok(Value::from(n.as_f64().map_or(false, |f| f != 0.0))),
            Value::String(s) => match s.trim() {
                "1" | "true" | "t" => Ok(Value::from(true)),
                "0" | "false" | "f" | "" => Ok(Value::from(false)),
                other => Err(format!("expected boolean, got '{other}'")),
            },
            other => Err(format!("expected boolean, got {other}")),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DatatypeName;
    use serde_json::json;

    fn row(values: Value) -> SourceRow {
        SourceRow::from_values(values.as_object().unwrap().clone()).unwrap()
    }

    fn descriptor(kind: TransformKind) -> DatatypeDescriptor {
        DatatypeDescriptor::builder(DatatypeName::new("test").unwrap(), kind)
            .fields(declared_fields(kind))
            .build()
    }

    #[test]
    fn test_every_static_kind_declares_id_first() {
        for kind in [
            TransformKind::User,
            TransformKind::Category,
            TransformKind::Course,
            TransformKind::Enrolment,
            TransformKind::RoleAssignment,
            TransformKind::Group,
            TransformKind::GroupMember,
            TransformKind::Activity,
            TransformKind::GradeItem,
            TransformKind::Grade,
            TransformKind::ForumPost,
            TransformKind::QuizAttempt,
            TransformKind::TrackingLog,
            TransformKind::LogEvent,
        ] {
            let fields = declared_fields(kind);
            assert_eq!(fields[0].name, "id", "{kind:?}");
            assert!(fields.iter().all(|f| f.name != "crud"), "{kind:?}");
        }
        assert!(declared_fields(TransformKind::Generic).is_empty());
    }

    #[test]
    fn test_tracking_log_transform() {
        let transform = EntityTransform::for_descriptor(&descriptor(TransformKind::TrackingLog), 100);
        let values = transform
            .apply(&row(json!({"id": 5, "userid": "7", "courseid": 3, "visits": 12, "lastaccess": 1_700_000_000})))
            .unwrap();
        assert_eq!(values["userid"], json!(7));
        assert_eq!(values.keys().collect::<Vec<_>>(), vec!["id", "userid", "courseid", "visits", "lastaccess"]);
    }

    #[test]
    fn test_missing_column_is_transform_error() {
        let transform = EntityTransform::for_descriptor(&descriptor(TransformKind::GroupMember), 100);
        let err = transform
            .apply(&row(json!({"id": 9, "groupid": 1, "userid": 2, "timeadded": 0})))
            .unwrap_err();
        match err {
            HarvestError::Transform { row_id, message, .. } => {
                assert_eq!(row_id, 9);
                assert!(message.contains("component"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_null_values_are_kept() {
        let transform = EntityTransform::for_descriptor(&descriptor(TransformKind::Grade), 100);
        let values = transform
            .apply(&row(json!({
                "id": 1, "itemid": 2, "userid": 3, "rawgrade": null, "finalgrade": "7.5",
                "hidden": 0, "locked": 0, "overridden": 0, "timecreated": null, "timemodified": 10
            })))
            .unwrap();
        assert_eq!(values["rawgrade"], Value::Null);
        assert_eq!(values["finalgrade"], json!(7.5));
    }

    #[test]
    fn test_integral_numbers_are_stored_as_floats() {
        let transform = EntityTransform::for_descriptor(&descriptor(TransformKind::Grade), 100);
        let values = transform
            .apply(&row(json!({
                "id": 1, "itemid": 2, "userid": 3, "rawgrade": 85, "finalgrade": 85,
                "hidden": 0, "locked": 0, "overridden": 0, "timecreated": 1, "timemodified": 1
            })))
            .unwrap();
        assert_eq!(values["finalgrade"], json!(85.0));
        assert!(values["rawgrade"].is_f64());
    }

    #[test]
    fn test_text_truncation_and_derived_fields() {
        let transform = EntityTransform::for_descriptor(&descriptor(TransformKind::User), 4);
        let values = transform
            .apply(&row(json!({
                "id": 1, "username": "annabelle", "auth": "manual", "firstname": "Ann",
                "lastname": "Lee", "email": "", "idnumber": "", "institution": "",
                "department": "", "city": "", "country": "", "lang": "en", "timezone": "99",
                "confirmed": 1, "suspended": 0, "deleted": "0", "firstaccess": 0,
                "lastaccess": 0, "lastlogin": 0, "timecreated": 0, "timemodified": 0
            })))
            .unwrap();
        assert_eq!(values["username"], json!("anna"));
        assert_eq!(values["fullname"], json!("Ann "));
        assert_eq!(values["confirmed"], json!(true));
        assert_eq!(values["deleted"], json!(false));
    }

    #[test]
    fn test_generic_passes_declared_fields() {
        let descriptor = DatatypeDescriptor::builder(DatatypeName::new("badges").unwrap(), TransformKind::Generic)
            .fields(vec![
                FieldDef::new("id", FieldKind::Integer),
                FieldDef::new("name", FieldKind::Text),
            ])
            .build();
        let transform = EntityTransform::for_descriptor(&descriptor, 100);
        let values = transform
            .apply(&row(json!({"id": 3, "name": "Gold", "secret": "x"})))
            .unwrap();
        assert_eq!(values.len(), 2);
        assert_eq!(values["name"], json!("Gold"));
    }

    #[test]
    fn test_redact_ip() {
        assert_eq!(redact_ip("192.168.10.42"), "192.168.10.0");
        assert_eq!(redact_ip("2001:db8::1"), "2001:db8::0");
        assert_eq!(redact_ip("garbage"), "");
    }

    #[test]
    fn test_truncate_text_respects_char_boundaries() {
        assert_eq!(truncate_text("héllo", 2), "hé");
        assert_eq!(truncate_text("abc", 10), "abc");
    }

    #[test]
    fn test_bad_integer_is_rejected() {
        let transform = EntityTransform::for_descriptor(&descriptor(TransformKind::TrackingLog), 100);
        let err = transform
            .apply(&row(json!({"id": 5, "userid": "seven", "courseid": 3, "visits": 1, "lastaccess": 1})))
            .unwrap_err();
        assert!(err.to_string().contains("userid"));
    }
}
