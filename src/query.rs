// Translates list-endpoint query strings into a store query descriptor.
use mongodb::bson::Document;
use serde::Deserialize;

use crate::errors::{AppError, AppResult};

/// Raw query parameters as they arrive on GET /api/tasks and GET /api/users.
/// Everything is optional; `filter` is a legacy alias for `select`.
#[derive(Debug, Deserialize, Default)]
pub struct RawQuery {
    #[serde(rename = "where")]
    pub where_clause: Option<String>,
    pub select: Option<String>,
    pub filter: Option<String>,
    pub sort: Option<String>,
    pub skip: Option<String>,
    pub limit: Option<String>,
    pub count: Option<String>,
}

/// Per-collection limit configuration. A `default_limit` of 0 means
/// unbounded unless the caller asks for less.
#[derive(Debug, Clone, Copy)]
pub struct QueryLimits {
    pub default_limit: i64,
    pub max_limit: i64,
}

/// Structured query descriptor consumed by the store. `limit == 0` means no
/// limit is applied.
#[derive(Debug, Default, PartialEq)]
pub struct QueryOptions {
    pub filter: Document,
    pub projection: Option<Document>,
    pub sort: Option<Document>,
    pub skip: u64,
    pub limit: i64,
    pub count: bool,
}

pub fn translate(raw: &RawQuery, limits: &QueryLimits) -> AppResult<QueryOptions> {
    let mut out = QueryOptions {
        limit: limits.default_limit,
        ..Default::default()
    };

    if let Some(s) = &raw.where_clause {
        out.filter = parse_json_param("where", s)?;
    }
    if let Some(s) = &raw.select {
        out.projection = Some(parse_json_param("select", s)?);
    }
    // Legacy alias: only consulted when select is absent.
    if out.projection.is_none() {
        if let Some(s) = &raw.filter {
            out.projection = Some(parse_json_param("filter", s)?);
        }
    }
    if let Some(s) = &raw.sort {
        out.sort = Some(parse_json_param("sort", s)?);
    }

    if let Some(s) = &raw.skip {
        out.skip = s.parse::<u64>().map_err(|_| {
            AppError::Validation(format!("skip must be a non-negative integer (got '{}')", s))
        })?;
    }

    if let Some(s) = &raw.limit {
        let limit = s.parse::<i64>().ok().filter(|l| *l >= 0).ok_or_else(|| {
            AppError::Validation(format!("limit must be a non-negative integer (got '{}')", s))
        })?;
        // The configured ceiling is hard, independent of what was requested;
        // an explicit 0 falls back to the collection default.
        out.limit = if limit == 0 {
            limits.default_limit
        } else {
            limit.min(limits.max_limit)
        };
    }

    if matches!(raw.count.as_deref(), Some("true") | Some("1")) {
        out.count = true;
    }

    Ok(out)
}

/// Query string accepted by the detail endpoints, which only support a
/// projection.
#[derive(Debug, Deserialize, Default)]
pub struct SelectQuery {
    pub select: Option<String>,
}

impl SelectQuery {
    pub fn projection(&self) -> AppResult<Option<Document>> {
        self.select
            .as_deref()
            .map(|s| parse_json_param("select", s))
            .transpose()
    }
}

fn parse_json_param(name: &str, raw: &str) -> AppResult<Document> {
    serde_json::from_str(raw).map_err(|_| {
        AppError::Validation(format!("Invalid JSON in {} parameter: '{}'", name, raw))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::doc;

    const LIMITS: QueryLimits = QueryLimits {
        default_limit: 100,
        max_limit: 1000,
    };

    fn raw() -> RawQuery {
        RawQuery::default()
    }

    #[test]
    fn test_defaults() {
        let q = translate(&raw(), &LIMITS).unwrap();
        assert_eq!(q.filter, doc! {});
        assert!(q.projection.is_none());
        assert!(q.sort.is_none());
        assert_eq!(q.skip, 0);
        assert_eq!(q.limit, 100);
        assert!(!q.count);
    }

    #[test]
    fn test_where_parses_to_filter() {
        let mut r = raw();
        r.where_clause = Some(r#"{"completed":true}"#.into());
        let q = translate(&r, &LIMITS).unwrap();
        assert_eq!(q.filter, doc! { "completed": true });
    }

    #[test]
    fn test_invalid_where_names_the_parameter() {
        let mut r = raw();
        r.where_clause = Some("{not json".into());
        let err = translate(&r, &LIMITS).unwrap_err();
        assert!(matches!(err, AppError::Validation(ref m)
            if m.contains("where") && m.contains("{not json")));
    }

    #[test]
    fn test_select_and_sort() {
        let mut r = raw();
        r.select = Some(r#"{"name":1}"#.into());
        r.sort = Some(r#"{"deadline":-1}"#.into());
        let q = translate(&r, &LIMITS).unwrap();
        assert_eq!(q.projection, Some(doc! { "name": 1 }));
        assert_eq!(q.sort, Some(doc! { "deadline": -1 }));
    }

    #[test]
    fn test_filter_alias_only_when_select_absent() {
        let mut r = raw();
        r.filter = Some(r#"{"name":1}"#.into());
        let q = translate(&r, &LIMITS).unwrap();
        assert_eq!(q.projection, Some(doc! { "name": 1 }));

        r.select = Some(r#"{"email":1}"#.into());
        let q = translate(&r, &LIMITS).unwrap();
        assert_eq!(q.projection, Some(doc! { "email": 1 }));
    }

    #[test]
    fn test_skip_rejects_negative_and_garbage() {
        let mut r = raw();
        r.skip = Some("-1".into());
        assert!(translate(&r, &LIMITS).is_err());

        r.skip = Some("abc".into());
        assert!(translate(&r, &LIMITS).is_err());

        r.skip = Some("25".into());
        assert_eq!(translate(&r, &LIMITS).unwrap().skip, 25);
    }

    #[test]
    fn test_limit_clamped_to_max() {
        let mut r = raw();
        r.limit = Some("5000".into());
        assert_eq!(translate(&r, &LIMITS).unwrap().limit, 1000);

        r.limit = Some("5".into());
        assert_eq!(translate(&r, &LIMITS).unwrap().limit, 5);
    }

    #[test]
    fn test_limit_zero_falls_back_to_default() {
        let mut r = raw();
        r.limit = Some("0".into());
        assert_eq!(translate(&r, &LIMITS).unwrap().limit, 100);

        // A zero default resolves to "unbounded".
        let unbounded = QueryLimits { default_limit: 0, max_limit: 1000 };
        assert_eq!(translate(&r, &unbounded).unwrap().limit, 0);
    }

    #[test]
    fn test_limit_rejects_negative_and_garbage() {
        let mut r = raw();
        r.limit = Some("-5".into());
        assert!(translate(&r, &LIMITS).is_err());

        r.limit = Some("lots".into());
        assert!(translate(&r, &LIMITS).is_err());
    }

    #[test]
    fn test_count_flag() {
        let mut r = raw();
        r.count = Some("true".into());
        assert!(translate(&r, &LIMITS).unwrap().count);

        r.count = Some("1".into());
        assert!(translate(&r, &LIMITS).unwrap().count);

        r.count = Some("yes".into());
        assert!(!translate(&r, &LIMITS).unwrap().count);
    }
}
