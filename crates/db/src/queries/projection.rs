// crates/db/src/queries/projection.rs
// Projection queries: expose nested payload fields as flat, filterable
// pseudo-columns over the current-record set.
//
// A collection path explodes a JSON array into one row per element via
// json_each, then re-aggregates the elements back into a single ordered,
// comma-joined string column grouped by job id. A scalar path extracts
// directly via json_extract. Composition is pure — nothing touches
// storage until `ProjectionQuery::fetch`.

use std::collections::BTreeMap;

use sqlx::Row;
use thiserror::Error;

use jobtrail_core::JobEvent;

use super::jobs::CURRENT_IDS_SQL;
use super::row_types::JobEventRow;
use crate::{Database, DbResult};

/// Base columns of the `jobs` table; pseudo-columns may not shadow them.
const BASE_COLUMNS: [&str; 6] = [
    "id",
    "message_id",
    "account_id",
    "payload",
    "status",
    "created_at",
];

/// Invalid projection request, rejected at build time before any SQL is
/// issued.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuerySpecError {
    /// Flattening two independent arrays in one row would produce a
    /// cross-product of their elements. Callers must split into one query
    /// per collection.
    #[error("only one collection path may be projected per query (got {requested})")]
    TooManyCollections { requested: usize },

    #[error("projection alias {alias:?} is not a plain identifier")]
    InvalidAlias { alias: String },

    #[error("projection alias {alias:?} shadows a base job column")]
    ReservedAlias { alias: String },

    #[error("payload path segment {segment:?} is not a plain identifier")]
    InvalidPathSegment { segment: String },
}

/// Which event rows a projection ranges over.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RecordScope {
    /// Latest snapshot per `message_id` (the default).
    #[default]
    Current,
    /// Every stored snapshot, historical included.
    All,
    /// An explicit id set supplied by the caller.
    Ids(Vec<i64>),
}

/// A value bound into a composed query.
#[derive(Debug, Clone, PartialEq)]
pub enum BindValue {
    Int(i64),
    Text(String),
}

impl From<i64> for BindValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for BindValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for BindValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Declarative spec for a projection query over the jobs event log.
#[derive(Debug, Clone, Default)]
pub struct ProjectionSpec {
    collections: BTreeMap<String, Vec<String>>,
    scalars: BTreeMap<String, Vec<String>>,
    account_ids: Vec<i64>,
    scope: RecordScope,
}

impl ProjectionSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spec preconfigured with the planned route exploded into a `route`
    /// column.
    pub fn with_route() -> Self {
        Self::new().collection("route", ["data", "router", "route"])
    }

    /// Spec preconfigured with completion markers exploded into a
    /// `complete` column.
    pub fn with_complete() -> Self {
        Self::new().collection("complete", ["complete"])
    }

    /// Expose the JSON array at `path` as an ordered, comma-joined string
    /// column named `alias`. At most one collection per query; jobs whose
    /// payload lacks the array produce no row.
    pub fn collection<I, S>(mut self, alias: &str, path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.collections.insert(
            alias.to_string(),
            path.into_iter().map(Into::into).collect(),
        );
        self
    }

    /// Expose the JSON scalar at `path` as a text column named `alias`.
    pub fn scalar<I, S>(mut self, alias: &str, path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scalars.insert(
            alias.to_string(),
            path.into_iter().map(Into::into).collect(),
        );
        self
    }

    /// Restrict to a single owning account.
    pub fn account(self, account_id: i64) -> Self {
        self.accounts([account_id])
    }

    /// Restrict to a set of owning accounts.
    pub fn accounts<I: IntoIterator<Item = i64>>(mut self, account_ids: I) -> Self {
        self.account_ids.extend(account_ids);
        self
    }

    /// Override the default current-record restriction.
    pub fn scope(mut self, scope: RecordScope) -> Self {
        self.scope = scope;
        self
    }

    /// Compose the SQL for this spec.
    ///
    /// Validation happens here, before any SQL reaches storage; the
    /// returned query is inert until fetched.
    pub fn build(self) -> Result<ProjectionQuery, QuerySpecError> {
        if self.collections.len() > 1 {
            return Err(QuerySpecError::TooManyCollections {
                requested: self.collections.len(),
            });
        }
        for (alias, path) in self.collections.iter().chain(self.scalars.iter()) {
            validate_alias(alias)?;
            for segment in path {
                if !is_identifier(segment) {
                    return Err(QuerySpecError::InvalidPathSegment {
                        segment: segment.clone(),
                    });
                }
            }
        }

        let mut select = vec![
            "jobs.id".to_string(),
            "jobs.message_id".to_string(),
            "jobs.account_id".to_string(),
            "jobs.payload".to_string(),
            "jobs.status".to_string(),
            "jobs.created_at".to_string(),
        ];
        let mut from = "jobs".to_string();
        let mut group_by = "";
        let mut binds: Vec<BindValue> = Vec::new();
        let mut aliases: Vec<String> = Vec::new();

        if let Some((alias, path)) = self.collections.iter().next() {
            select.push(format!(
                "group_concat(elm.value, ',' ORDER BY elm.key) AS {alias}"
            ));
            from.push_str(&format!(
                ", json_each(jobs.payload, '{}') AS elm",
                json_path(path)
            ));
            group_by = " GROUP BY jobs.id";
            aliases.push(alias.clone());
        }

        for (alias, path) in &self.scalars {
            select.push(format!(
                "CAST(json_extract(jobs.payload, '{}') AS TEXT) AS {alias}",
                json_path(path)
            ));
            aliases.push(alias.clone());
        }

        let mut inner_where = String::new();
        if !self.account_ids.is_empty() {
            inner_where = format!(
                " WHERE jobs.account_id IN ({})",
                placeholders(self.account_ids.len())
            );
            binds.extend(self.account_ids.iter().copied().map(BindValue::Int));
        }

        let inner_sql = format!(
            "SELECT {} FROM {}{}{}",
            select.join(", "),
            from,
            inner_where,
            group_by
        );

        let mut conditions: Vec<String> = Vec::new();
        match self.scope {
            RecordScope::Current => {
                // The account filter narrows the current-id set too, so a
                // job whose latest snapshot belongs to another account is
                // excluded rather than replaced by an older snapshot.
                if self.account_ids.is_empty() {
                    conditions.push(format!("jobs.id IN ({CURRENT_IDS_SQL})"));
                } else {
                    conditions.push(format!(
                        "jobs.id IN ({CURRENT_IDS_SQL} AND jobs.account_id IN ({}))",
                        placeholders(self.account_ids.len())
                    ));
                    binds.extend(self.account_ids.iter().copied().map(BindValue::Int));
                }
            }
            RecordScope::All => {}
            RecordScope::Ids(ids) => {
                if ids.is_empty() {
                    // An explicit empty id set selects nothing.
                    conditions.push("0 = 1".to_string());
                } else {
                    conditions.push(format!("jobs.id IN ({})", placeholders(ids.len())));
                    binds.extend(ids.into_iter().map(BindValue::Int));
                }
            }
        }

        Ok(ProjectionQuery {
            inner_sql,
            conditions,
            binds,
            aliases,
        })
    }
}

/// A composed, un-executed projection query: SQL text plus bind values.
///
/// Callers may stack further equality predicates on base columns or
/// projected aliases before fetching.
#[derive(Debug, Clone)]
pub struct ProjectionQuery {
    inner_sql: String,
    conditions: Vec<String>,
    binds: Vec<BindValue>,
    aliases: Vec<String>,
}

impl ProjectionQuery {
    /// The full SQL this query would execute.
    pub fn sql(&self) -> String {
        let mut sql = format!("SELECT * FROM ({}) AS jobs", self.inner_sql);
        if !self.conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.conditions.join(" AND "));
        }
        sql.push_str(" ORDER BY jobs.id");
        sql
    }

    /// Append an `AND column = value` predicate on the projected relation.
    /// The column may be a base column or a projected alias.
    pub fn filter(
        mut self,
        column: &str,
        value: impl Into<BindValue>,
    ) -> Result<Self, QuerySpecError> {
        if !is_identifier(column) {
            return Err(QuerySpecError::InvalidAlias {
                alias: column.to_string(),
            });
        }
        self.conditions.push(format!("jobs.{column} = ?"));
        self.binds.push(value.into());
        Ok(self)
    }

    /// Execute against the database, decoding the base event columns plus
    /// the requested pseudo-columns.
    pub async fn fetch(&self, db: &Database) -> DbResult<Vec<ProjectedJob>> {
        let sql = self.sql();
        let mut query = sqlx::query(&sql);
        for bind in &self.binds {
            query = match bind {
                BindValue::Int(value) => query.bind(*value),
                BindValue::Text(value) => query.bind(value.clone()),
            };
        }
        let rows = query.fetch_all(db.pool()).await?;

        let mut projected = Vec::with_capacity(rows.len());
        for row in rows {
            let event = <JobEventRow as sqlx::FromRow<'_, sqlx::sqlite::SqliteRow>>::from_row(
                &row,
            )?
            .into_event()?;
            let mut fields = BTreeMap::new();
            for alias in &self.aliases {
                let value: Option<String> = row.try_get(alias.as_str())?;
                fields.insert(alias.clone(), value);
            }
            projected.push(ProjectedJob { event, fields });
        }
        Ok(projected)
    }
}

/// One row of a projection: the base event plus its flattened
/// pseudo-columns.
#[derive(Debug, Clone)]
pub struct ProjectedJob {
    pub event: JobEvent,
    pub fields: BTreeMap<String, Option<String>>,
}

impl ProjectedJob {
    /// Value of a projected pseudo-column.
    pub fn field(&self, alias: &str) -> Option<&str> {
        self.fields.get(alias).and_then(|value| value.as_deref())
    }
}

fn validate_alias(alias: &str) -> Result<(), QuerySpecError> {
    if !is_identifier(alias) {
        return Err(QuerySpecError::InvalidAlias {
            alias: alias.to_string(),
        });
    }
    if BASE_COLUMNS.contains(&alias) {
        return Err(QuerySpecError::ReservedAlias {
            alias: alias.to_string(),
        });
    }
    Ok(())
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// `["data", "router", "route"]` -> `$.data.router.route`
fn json_path(segments: &[String]) -> String {
    format!("$.{}", segments.join("."))
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;
    use jobtrail_core::NewJobEvent;
    use serde_json::json;

    async fn setup_db() -> Database {
        Database::new_in_memory()
            .await
            .expect("in-memory DB should open")
    }

    async fn append(db: &Database, message_id: &str, account_id: i64, payload: serde_json::Value) {
        db.append_event(NewJobEvent::new(message_id, account_id, payload))
            .await
            .unwrap();
    }

    #[test]
    fn test_build_rejects_two_collections() {
        let err = ProjectionSpec::new()
            .collection("route", ["data", "router", "route"])
            .collection("complete", ["complete"])
            .build()
            .unwrap_err();
        assert_eq!(err, QuerySpecError::TooManyCollections { requested: 2 });
    }

    #[test]
    fn test_build_accepts_zero_or_one_collection() {
        assert!(ProjectionSpec::new().build().is_ok());
        assert!(ProjectionSpec::with_route().build().is_ok());
    }

    #[test]
    fn test_build_rejects_non_identifier_text() {
        let err = ProjectionSpec::new()
            .scalar("bad-alias", ["job"])
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            QuerySpecError::InvalidAlias {
                alias: "bad-alias".to_string()
            }
        );

        let err = ProjectionSpec::new()
            .scalar("task", ["data", "router'; drop table jobs --"])
            .build()
            .unwrap_err();
        assert!(matches!(err, QuerySpecError::InvalidPathSegment { .. }));

        let err = ProjectionSpec::new()
            .scalar("payload", ["job"])
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            QuerySpecError::ReservedAlias {
                alias: "payload".to_string()
            }
        );
    }

    #[test]
    fn test_build_is_pure_composition() {
        // Building never needs a database; the SQL is inspectable as-is.
        let query = ProjectionSpec::with_route().build().unwrap();
        let sql = query.sql();
        assert!(sql.contains("json_each(jobs.payload, '$.data.router.route')"));
        assert!(sql.contains("GROUP BY jobs.id"));
        assert!(sql.contains("LEFT JOIN jobs AS j2"));
    }

    #[tokio::test]
    async fn test_collection_flattens_array_in_payload_order() {
        let db = setup_db().await;
        append(
            &db,
            "m1",
            1,
            json!({ "data": { "router": { "route": ["gamma", "alpha", "beta"] } } }),
        )
        .await;

        let rows = ProjectionSpec::with_route()
            .build()
            .unwrap()
            .fetch(&db)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        // Aggregation must not reorder: payload order, not sorted order.
        assert_eq!(rows[0].field("route"), Some("gamma,alpha,beta"));
        assert_eq!(rows[0].event.message_id, "m1");
    }

    #[tokio::test]
    async fn test_complete_collection_keeps_sub_step_markers() {
        let db = setup_db().await;
        append(&db, "m1", 1, json!({ "complete": ["svc1", "svc2:sub"] })).await;

        let rows = ProjectionSpec::with_complete()
            .build()
            .unwrap()
            .fetch(&db)
            .await
            .unwrap();
        assert_eq!(rows[0].field("complete"), Some("svc1,svc2:sub"));
    }

    #[tokio::test]
    async fn test_jobs_without_the_array_produce_no_row() {
        let db = setup_db().await;
        append(&db, "routed", 1, json!({ "data": { "router": { "route": ["a"] } } })).await;
        append(&db, "bare", 1, json!({})).await;

        let rows = ProjectionSpec::with_route()
            .build()
            .unwrap()
            .fetch(&db)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].event.message_id, "routed");
    }

    #[tokio::test]
    async fn test_scalar_extracts_nested_value() {
        let db = setup_db().await;
        append(
            &db,
            "m1",
            1,
            json!({ "job": "finalize", "data": { "router": { "action": "build" } } }),
        )
        .await;
        append(&db, "m2", 1, json!({})).await;

        let rows = ProjectionSpec::new()
            .scalar("task", ["data", "router", "action"])
            .scalar("terminal", ["job"])
            .build()
            .unwrap()
            .fetch(&db)
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].field("task"), Some("build"));
        assert_eq!(rows[0].field("terminal"), Some("finalize"));
        // Absent scalars read as NULL, the row itself is kept.
        assert_eq!(rows[1].field("task"), None);
    }

    #[tokio::test]
    async fn test_projection_is_restricted_to_current_records() {
        let db = setup_db().await;
        append(&db, "m1", 1, json!({ "data": { "router": { "route": ["old"] } } })).await;
        append(&db, "m1", 1, json!({ "data": { "router": { "route": ["new"] } } })).await;

        let rows = ProjectionSpec::with_route()
            .build()
            .unwrap()
            .fetch(&db)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].field("route"), Some("new"));
    }

    #[tokio::test]
    async fn test_scope_all_includes_historical_snapshots() {
        let db = setup_db().await;
        append(&db, "m1", 1, json!({ "step": 1 })).await;
        append(&db, "m1", 1, json!({ "step": 2 })).await;

        let rows = ProjectionSpec::new()
            .scope(RecordScope::All)
            .build()
            .unwrap()
            .fetch(&db)
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn test_scope_ids_overrides_current_restriction() {
        let db = setup_db().await;
        append(&db, "m1", 1, json!({ "step": 1 })).await;
        append(&db, "m1", 1, json!({ "step": 2 })).await;
        let historical_id = db.job_history("m1").await.unwrap()[0].id;

        let rows = ProjectionSpec::new()
            .scope(RecordScope::Ids(vec![historical_id]))
            .build()
            .unwrap()
            .fetch(&db)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].event.id, historical_id);

        let empty = ProjectionSpec::new()
            .scope(RecordScope::Ids(Vec::new()))
            .build()
            .unwrap()
            .fetch(&db)
            .await
            .unwrap();
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn test_account_filter_narrows_rows_and_current_set() {
        let db = setup_db().await;
        append(&db, "mine", 7, json!({})).await;
        append(&db, "theirs", 8, json!({})).await;

        let rows = ProjectionSpec::new()
            .account(7)
            .build()
            .unwrap()
            .fetch(&db)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].event.account_id, 7);

        let rows = ProjectionSpec::new()
            .accounts([7, 8])
            .build()
            .unwrap()
            .fetch(&db)
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn test_caller_composed_filters_on_pseudo_columns() {
        let db = setup_db().await;
        append(
            &db,
            "m1",
            1,
            json!({ "data": { "router": { "action": "build" } } }),
        )
        .await;
        append(
            &db,
            "m2",
            1,
            json!({ "data": { "router": { "action": "deploy" } } }),
        )
        .await;

        let rows = ProjectionSpec::new()
            .scalar("task", ["data", "router", "action"])
            .build()
            .unwrap()
            .filter("task", "deploy")
            .unwrap()
            .fetch(&db)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].event.message_id, "m2");

        // Base columns compose the same way.
        let rows = ProjectionSpec::new()
            .build()
            .unwrap()
            .filter("message_id", "m1")
            .unwrap()
            .fetch(&db)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);

        let err = ProjectionSpec::new()
            .build()
            .unwrap()
            .filter("task; --", "x")
            .unwrap_err();
        assert!(matches!(err, QuerySpecError::InvalidAlias { .. }));
    }
}
