//! Flat resume projection
//!
//! The search API nests area, gender, salary and photo in sub-objects. The
//! sink stores one flat row per resume, so those are collapsed here; a null
//! sub-object yields `None` for each of its fields.

use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use serde_json::Value;

use crate::error::ValidationError;

/// One validated resume, ready for the sink.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResumeRecord {
    pub id: String,
    pub alternate_url: String,
    pub created_at: DateTime<FixedOffset>,
    pub updated_at: DateTime<FixedOffset>,
    pub age: Option<i64>,
    pub title: Option<String>,
    pub education: Option<Value>,
    pub experience: Option<Value>,
    pub area_id: Option<String>,
    pub area_name: Option<String>,
    pub gender_id: Option<String>,
    pub salary_amount: Option<i64>,
    pub salary_currency: Option<String>,
    pub photo_medium: Option<String>,
}

impl ResumeRecord {
    /// Project one raw search item.
    pub fn from_raw(raw: &Value) -> Result<Self, ValidationError> {
        let obj = raw
            .as_object()
            .ok_or_else(|| invalid("record", "not a JSON object"))?;
        let get = |key: &str| obj.get(key).filter(|v| !v.is_null());

        let id = match get("id") {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            Some(_) => return Err(invalid("id", "expected a non-empty string")),
            None => return Err(ValidationError::Missing("id")),
        };

        let alternate_url = required_url(get("alternate_url"), "alternate_url")?;
        let created_at = required_time(get("created_at"), "created_at")?;
        let updated_at = required_time(get("updated_at"), "updated_at")?;

        let area = nested(get("area"), "area")?;
        let gender = nested(get("gender"), "gender")?;
        let salary = nested(get("salary"), "salary")?;
        let photo = nested(get("photo"), "photo")?;

        Ok(Self {
            id,
            alternate_url,
            created_at,
            updated_at,
            age: optional_int(get("age"), "age")?,
            title: optional_string(get("title"), "title")?,
            education: get("education").cloned(),
            experience: get("experience").cloned(),
            area_id: optional_id(field(area, "id"), "area.id")?,
            area_name: optional_string(field(area, "name"), "area.name")?,
            gender_id: optional_id(field(gender, "id"), "gender.id")?,
            salary_amount: optional_int(field(salary, "amount"), "salary.amount")?,
            salary_currency: optional_string(field(salary, "currency"), "salary.currency")?,
            photo_medium: field(photo, "medium")
                .map(|v| url(v, "photo.medium"))
                .transpose()?,
        })
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ValidationError {
    ValidationError::Invalid {
        field,
        reason: reason.into(),
    }
}

fn nested<'a>(
    value: Option<&'a Value>,
    name: &'static str,
) -> Result<Option<&'a serde_json::Map<String, Value>>, ValidationError> {
    match value {
        None => Ok(None),
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(_) => Err(invalid(name, "expected an object")),
    }
}

fn field<'a>(
    parent: Option<&'a serde_json::Map<String, Value>>,
    key: &str,
) -> Option<&'a Value> {
    parent.and_then(|p| p.get(key)).filter(|v| !v.is_null())
}

fn optional_string(value: Option<&Value>, name: &'static str) -> Result<Option<String>, ValidationError> {
    match value {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(invalid(name, "expected a string")),
    }
}

/// Dictionary ids arrive as strings but older payloads use numbers.
fn optional_id(value: Option<&Value>, name: &'static str) -> Result<Option<String>, ValidationError> {
    match value {
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        other => optional_string(other, name),
    }
}

fn optional_int(value: Option<&Value>, name: &'static str) -> Result<Option<i64>, ValidationError> {
    match value {
        None => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
            .map(Some)
            .ok_or_else(|| invalid(name, format!("not an integer: {n}"))),
        Some(Value::String(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| invalid(name, format!("not an integer: {s}"))),
        Some(_) => Err(invalid(name, "expected an integer")),
    }
}

fn url(value: &Value, name: &'static str) -> Result<String, ValidationError> {
    match value {
        Value::String(s) if s.starts_with("http://") || s.starts_with("https://") => Ok(s.clone()),
        Value::String(s) => Err(invalid(name, format!("not an http(s) URL: {s}"))),
        _ => Err(invalid(name, "expected a URL string")),
    }
}

fn required_url(value: Option<&Value>, name: &'static str) -> Result<String, ValidationError> {
    url(value.ok_or(ValidationError::Missing(name))?, name)
}

/// The API renders `2024-01-15T10:30:00+0300`; RFC 3339 is accepted too.
fn required_time(
    value: Option<&Value>,
    name: &'static str,
) -> Result<DateTime<FixedOffset>, ValidationError> {
    let Some(value) = value else {
        return Err(ValidationError::Missing(name));
    };
    let Value::String(s) = value else {
        return Err(invalid(name, "expected a timestamp string"));
    };
    DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%z")
        .or_else(|_| DateTime::parse_from_rfc3339(s))
        .map_err(|e| invalid(name, format!("{s}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "id": "0123abcd",
            "alternate_url": "https://hh.ru/resume/0123abcd",
            "created_at": "2024-01-15T10:30:00+0300",
            "updated_at": "2024-02-01T08:00:00+0300",
            "age": 31,
            "title": "Backend developer",
            "education": {"level": {"id": "higher"}},
            "experience": [{"company": "Acme"}],
            "area": {"id": "1", "name": "Moscow", "url": "https://api.hh.ru/areas/1"},
            "gender": {"id": "male", "name": "Male"},
            "salary": {"amount": 250000, "currency": "RUR"},
            "photo": {"medium": "https://img.hh.ru/photo/1.jpg", "small": "https://img.hh.ru/photo/1s.jpg"}
        })
    }

    #[test]
    fn projects_nested_fields_flat() {
        let record = ResumeRecord::from_raw(&sample()).unwrap();
        assert_eq!(record.id, "0123abcd");
        assert_eq!(record.area_id.as_deref(), Some("1"));
        assert_eq!(record.area_name.as_deref(), Some("Moscow"));
        assert_eq!(record.gender_id.as_deref(), Some("male"));
        assert_eq!(record.salary_amount, Some(250_000));
        assert_eq!(record.salary_currency.as_deref(), Some("RUR"));
        assert_eq!(record.photo_medium.as_deref(), Some("https://img.hh.ru/photo/1.jpg"));
        assert_eq!(record.age, Some(31));
        assert_eq!(record.created_at.to_rfc3339(), "2024-01-15T10:30:00+03:00");
        assert!(record.experience.unwrap().is_array());
    }

    #[test]
    fn null_sub_objects_collapse_to_none() {
        let mut raw = sample();
        raw["salary"] = Value::Null;
        raw["photo"] = Value::Null;
        raw["age"] = Value::Null;
        raw.as_object_mut().unwrap().remove("gender");

        let record = ResumeRecord::from_raw(&raw).unwrap();
        assert_eq!(record.salary_amount, None);
        assert_eq!(record.salary_currency, None);
        assert_eq!(record.photo_medium, None);
        assert_eq!(record.gender_id, None);
        assert_eq!(record.age, None);
    }

    #[test]
    fn accepts_rfc3339_timestamps() {
        let mut raw = sample();
        raw["updated_at"] = json!("2024-02-01T05:00:00Z");
        let record = ResumeRecord::from_raw(&raw).unwrap();
        assert_eq!(record.updated_at.timestamp(), 1_706_763_600);
    }

    #[test]
    fn missing_required_fields_are_reported() {
        for field in ["id", "alternate_url", "created_at", "updated_at"] {
            let mut raw = sample();
            raw.as_object_mut().unwrap().remove(field);
            let err = ResumeRecord::from_raw(&raw).unwrap_err();
            assert_eq!(err, ValidationError::Missing(field));
        }
    }

    #[test]
    fn rejects_non_http_urls() {
        let mut raw = sample();
        raw["alternate_url"] = json!("ftp://hh.ru/resume/1");
        assert!(matches!(
            ResumeRecord::from_raw(&raw),
            Err(ValidationError::Invalid { field: "alternate_url", .. })
        ));
    }

    #[test]
    fn rejects_malformed_timestamp() {
        let mut raw = sample();
        raw["created_at"] = json!("yesterday");
        assert!(matches!(
            ResumeRecord::from_raw(&raw),
            Err(ValidationError::Invalid { field: "created_at", .. })
        ));
    }

    #[test]
    fn rejects_wrongly_typed_sub_object() {
        let mut raw = sample();
        raw["area"] = json!("Moscow");
        assert!(matches!(
            ResumeRecord::from_raw(&raw),
            Err(ValidationError::Invalid { field: "area", .. })
        ));
    }

    #[test]
    fn coerces_numeric_strings_and_ids() {
        let mut raw = sample();
        raw["age"] = json!("27");
        raw["area"]["id"] = json!(113);
        let record = ResumeRecord::from_raw(&raw).unwrap();
        assert_eq!(record.age, Some(27));
        assert_eq!(record.area_id.as_deref(), Some("113"));
    }

    #[test]
    fn non_object_item_is_invalid() {
        assert!(ResumeRecord::from_raw(&json!([1, 2])).is_err());
    }
}
