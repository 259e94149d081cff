use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{Column as _, Row as _, TypeInfo as _};

use crate::error::{Result, StoreError};

/// Typed SQL parameter. Each variant carries its own nullability so
/// placeholders keep a stable Postgres type across transports.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum SqlParam {
    Text(Option<String>),
    Int(Option<i64>),
    Float(Option<f64>),
    Decimal(Option<Decimal>),
    Bool(Option<bool>),
    TextArray(Vec<Option<String>>),
    IntArray(Vec<i32>),
    Vector(Vec<f32>),
}

/// One column value as returned by a transport.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Text(String),
    Int(i64),
    Float(f64),
    Decimal(Decimal),
    Bool(bool),
    TextArray(Vec<Option<String>>),
    Timestamp(DateTime<Utc>),
    Null,
}

/// Column-name keyed result row with coercing getters.
#[derive(Debug, Clone, Default)]
pub struct Row {
    columns: HashMap<String, SqlValue>,
}

impl Row {
    #[must_use]
    pub fn from_columns(columns: HashMap<String, SqlValue>) -> Self {
        Self { columns }
    }

    fn get(&self, column: &str) -> Result<&SqlValue> {
        self.columns
            .get(column)
            .ok_or_else(|| StoreError::Decode(format!("missing column {column}")))
    }

    /// # Errors
    ///
    /// Returns a decode error if the column is missing or not textual.
    pub fn text(&self, column: &str) -> Result<String> {
        match self.get(column)? {
            SqlValue::Text(s) => Ok(s.clone()),
            other => Err(StoreError::Decode(format!(
                "column {column}: expected text, got {other:?}"
            ))),
        }
    }

    /// # Errors
    ///
    /// Returns a decode error if the column is missing or not textual/null.
    pub fn opt_text(&self, column: &str) -> Result<Option<String>> {
        match self.get(column)? {
            SqlValue::Text(s) => Ok(Some(s.clone())),
            SqlValue::Null => Ok(None),
            other => Err(StoreError::Decode(format!(
                "column {column}: expected text or null, got {other:?}"
            ))),
        }
    }

    /// # Errors
    ///
    /// Returns a decode error if the column is missing or not integral.
    pub fn int(&self, column: &str) -> Result<i64> {
        match self.get(column)? {
            SqlValue::Int(i) => Ok(*i),
            other => Err(StoreError::Decode(format!(
                "column {column}: expected int, got {other:?}"
            ))),
        }
    }

    /// Coerces ints and floats; mediated transports frequently widen.
    ///
    /// # Errors
    ///
    /// Returns a decode error if the column is missing or not numeric.
    #[allow(clippy::cast_precision_loss)]
    pub fn float(&self, column: &str) -> Result<f64> {
        match self.get(column)? {
            SqlValue::Float(f) => Ok(*f),
            SqlValue::Int(i) => Ok(*i as f64),
            SqlValue::Null => Ok(0.0),
            other => Err(StoreError::Decode(format!(
                "column {column}: expected float, got {other:?}"
            ))),
        }
    }

    /// Accepts native numerics and decimal-as-text, which is how JSON
    /// transports ship exact values.
    ///
    /// # Errors
    ///
    /// Returns a decode error if the column cannot be read as a decimal.
    pub fn decimal(&self, column: &str) -> Result<Decimal> {
        match self.get(column)? {
            SqlValue::Decimal(d) => Ok(*d),
            SqlValue::Int(i) => Ok(Decimal::from(*i)),
            SqlValue::Text(s) => s
                .parse()
                .map_err(|e| StoreError::Decode(format!("column {column}: {e}"))),
            SqlValue::Float(f) => Decimal::try_from(*f)
                .map_err(|e| StoreError::Decode(format!("column {column}: {e}"))),
            other => Err(StoreError::Decode(format!(
                "column {column}: expected decimal, got {other:?}"
            ))),
        }
    }

    /// # Errors
    ///
    /// Returns a decode error if the column is missing or not an array.
    pub fn text_array(&self, column: &str) -> Result<Vec<String>> {
        match self.get(column)? {
            SqlValue::TextArray(items) => Ok(items.iter().flatten().cloned().collect()),
            SqlValue::Null => Ok(Vec::new()),
            other => Err(StoreError::Decode(format!(
                "column {column}: expected text array, got {other:?}"
            ))),
        }
    }

    /// Accepts native timestamps and RFC 3339 text.
    ///
    /// # Errors
    ///
    /// Returns a decode error if the column cannot be read as a timestamp.
    pub fn timestamp(&self, column: &str) -> Result<DateTime<Utc>> {
        match self.get(column)? {
            SqlValue::Timestamp(ts) => Ok(*ts),
            SqlValue::Text(s) => s
                .parse()
                .map_err(|e| StoreError::Decode(format!("column {column}: {e}"))),
            other => Err(StoreError::Decode(format!(
                "column {column}: expected timestamp, got {other:?}"
            ))),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// The store is spoken to through exactly one operation.
pub trait StoreTransport: Send + Sync {
    /// Run a parameterized statement and return its rows.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Unavailable` on connectivity failure, transport
    /// specific errors otherwise.
    fn execute(
        &self,
        sql: &str,
        params: &[SqlParam],
    ) -> impl Future<Output = Result<Vec<Row>>> + Send;

    fn name(&self) -> &'static str;
}

const DEFAULT_STATEMENT_DEADLINE: Duration = Duration::from_secs(10);

/// Direct Postgres transport over a sqlx connection pool.
#[derive(Debug, Clone)]
pub struct DirectTransport {
    pool: sqlx::PgPool,
    deadline: Duration,
}

impl DirectTransport {
    /// Connect a pool to the given database URL.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Unavailable` if the database cannot be reached.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(url)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(Self::from_pool(pool))
    }

    #[must_use]
    pub fn from_pool(pool: sqlx::PgPool) -> Self {
        Self {
            pool,
            deadline: DEFAULT_STATEMENT_DEADLINE,
        }
    }

    /// Per-statement deadline; an expired statement surfaces as
    /// `StoreError::Unavailable`.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    #[must_use]
    pub fn pool(&self) -> &sqlx::PgPool {
        &self.pool
    }
}

fn classify_sqlx(e: sqlx::Error) -> StoreError {
    match &e {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StoreError::Unavailable(e.to_string())
        }
        _ => StoreError::Sql(e),
    }
}

fn bind_param<'q>(
    query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
    param: &'q SqlParam,
) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
    match param {
        SqlParam::Text(v) => query.bind(v.as_deref()),
        SqlParam::Int(v) => query.bind(*v),
        SqlParam::Float(v) => query.bind(*v),
        SqlParam::Decimal(v) => query.bind(*v),
        SqlParam::Bool(v) => query.bind(*v),
        SqlParam::TextArray(v) => query.bind(v),
        SqlParam::IntArray(v) => query.bind(v),
        SqlParam::Vector(v) => query.bind(pgvector::Vector::from(v.clone())),
    }
}

fn decode_pg_row(row: &PgRow) -> Result<Row> {
    let mut columns = HashMap::with_capacity(row.columns().len());
    for column in row.columns() {
        let name = column.name().to_string();
        let idx = column.ordinal();
        let value = match column.type_info().name() {
            "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => row
                .try_get::<Option<String>, _>(idx)
                .map(|v| v.map_or(SqlValue::Null, SqlValue::Text)),
            "INT2" => row
                .try_get::<Option<i16>, _>(idx)
                .map(|v| v.map_or(SqlValue::Null, |i| SqlValue::Int(i64::from(i)))),
            "INT4" => row
                .try_get::<Option<i32>, _>(idx)
                .map(|v| v.map_or(SqlValue::Null, |i| SqlValue::Int(i64::from(i)))),
            "INT8" => row
                .try_get::<Option<i64>, _>(idx)
                .map(|v| v.map_or(SqlValue::Null, SqlValue::Int)),
            "FLOAT4" => row
                .try_get::<Option<f32>, _>(idx)
                .map(|v| v.map_or(SqlValue::Null, |f| SqlValue::Float(f64::from(f)))),
            "FLOAT8" => row
                .try_get::<Option<f64>, _>(idx)
                .map(|v| v.map_or(SqlValue::Null, SqlValue::Float)),
            "NUMERIC" => row
                .try_get::<Option<Decimal>, _>(idx)
                .map(|v| v.map_or(SqlValue::Null, SqlValue::Decimal)),
            "BOOL" => row
                .try_get::<Option<bool>, _>(idx)
                .map(|v| v.map_or(SqlValue::Null, SqlValue::Bool)),
            "TEXT[]" | "VARCHAR[]" => row
                .try_get::<Option<Vec<Option<String>>>, _>(idx)
                .map(|v| v.map_or(SqlValue::Null, SqlValue::TextArray)),
            "TIMESTAMPTZ" => row
                .try_get::<Option<DateTime<Utc>>, _>(idx)
                .map(|v| v.map_or(SqlValue::Null, SqlValue::Timestamp)),
            other => {
                return Err(StoreError::Decode(format!(
                    "unsupported column type {other} for {name}"
                )));
            }
        }
        .map_err(classify_sqlx)?;
        columns.insert(name, value);
    }
    Ok(Row::from_columns(columns))
}

impl StoreTransport for DirectTransport {
    async fn execute(&self, sql: &str, params: &[SqlParam]) -> Result<Vec<Row>> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_param(query, param);
        }
        let rows = tokio::time::timeout(self.deadline, query.fetch_all(&self.pool))
            .await
            .map_err(|_| {
                StoreError::Unavailable(format!(
                    "statement exceeded {}ms deadline",
                    self.deadline.as_millis()
                ))
            })?
            .map_err(classify_sqlx)?;
        rows.iter().map(decode_pg_row).collect()
    }

    fn name(&self) -> &'static str {
        "direct"
    }
}

/// Mediated transport: the same SQL surface spoken to an external tool server
/// exposing `connect` and `run_query`.
#[derive(Debug)]
pub struct MediatedTransport {
    client: reqwest::Client,
    base_url: String,
    deadline: Duration,
    connection_id: tokio::sync::OnceCell<String>,
}

impl MediatedTransport {
    #[must_use]
    pub fn new(mut base_url: String) -> Self {
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            client: reqwest::Client::new(),
            base_url,
            deadline: DEFAULT_STATEMENT_DEADLINE,
            connection_id: tokio::sync::OnceCell::new(),
        }
    }

    /// Per-request deadline for `connect` and `run_query`.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    async fn connection_id(&self) -> Result<&str> {
        self.connection_id
            .get_or_try_init(|| async {
                let response = self
                    .client
                    .post(format!("{}/connect", self.base_url))
                    .timeout(self.deadline)
                    .json(&serde_json::json!({}))
                    .send()
                    .await
                    .map_err(|e| StoreError::Unavailable(e.to_string()))?;
                if !response.status().is_success() {
                    return Err(StoreError::Mediated(format!(
                        "connect failed (status {})",
                        response.status()
                    )));
                }
                let body: ConnectResponse = response
                    .json()
                    .await
                    .map_err(|e| StoreError::Mediated(e.to_string()))?;
                tracing::debug!(connection_id = %body.connection_id, "tool server connected");
                Ok(body.connection_id)
            })
            .await
            .map(String::as_str)
    }
}

#[derive(Deserialize)]
struct ConnectResponse {
    connection_id: String,
}

#[derive(Serialize)]
struct RunQueryRequest<'a> {
    connection_id: &'a str,
    sql: &'a str,
    params: &'a [SqlParam],
}

#[derive(Deserialize)]
struct RunQueryResponse {
    rows: Vec<HashMap<String, serde_json::Value>>,
}

fn json_to_sql_value(value: serde_json::Value) -> SqlValue {
    match value {
        serde_json::Value::Null => SqlValue::Null,
        serde_json::Value::Bool(b) => SqlValue::Bool(b),
        serde_json::Value::Number(n) => n
            .as_i64()
            .map(SqlValue::Int)
            .or_else(|| n.as_f64().map(SqlValue::Float))
            .unwrap_or(SqlValue::Null),
        serde_json::Value::String(s) => SqlValue::Text(s),
        serde_json::Value::Array(items) => SqlValue::TextArray(
            items
                .into_iter()
                .map(|v| match v {
                    serde_json::Value::String(s) => Some(s),
                    serde_json::Value::Null => None,
                    other => Some(other.to_string()),
                })
                .collect(),
        ),
        serde_json::Value::Object(_) => SqlValue::Null,
    }
}

impl StoreTransport for MediatedTransport {
    async fn execute(&self, sql: &str, params: &[SqlParam]) -> Result<Vec<Row>> {
        let connection_id = self.connection_id().await?;
        let request = RunQueryRequest {
            connection_id,
            sql,
            params,
        };

        let response = self
            .client
            .post(format!("{}/run_query", self.base_url))
            .timeout(self.deadline)
            .json(&request)
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(StoreError::Mediated(format!(
                "run_query failed (status {})",
                response.status()
            )));
        }

        let body: RunQueryResponse = response
            .json()
            .await
            .map_err(|e| StoreError::Mediated(e.to_string()))?;

        Ok(body
            .rows
            .into_iter()
            .map(|columns| {
                Row::from_columns(
                    columns
                        .into_iter()
                        .map(|(name, value)| (name, json_to_sql_value(value)))
                        .collect(),
                )
            })
            .collect())
    }

    fn name(&self) -> &'static str {
        "mediated"
    }
}

/// Generates a match over all `AnyTransport` variants, binding the inner
/// transport and evaluating the given closure for each arm.
macro_rules! delegate_transport {
    ($self:expr, |$t:ident| $expr:expr) => {
        match $self {
            AnyTransport::Direct($t) => $expr,
            AnyTransport::Mediated($t) => $expr,
        }
    };
}

/// Runtime-selected transport, so both phases share one catalog type.
#[derive(Debug)]
pub enum AnyTransport {
    Direct(DirectTransport),
    Mediated(MediatedTransport),
}

impl StoreTransport for AnyTransport {
    async fn execute(&self, sql: &str, params: &[SqlParam]) -> Result<Vec<Row>> {
        delegate_transport!(self, |t| t.execute(sql, params).await)
    }

    fn name(&self) -> &'static str {
        delegate_transport!(self, |t| t.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row_with(column: &str, value: SqlValue) -> Row {
        Row::from_columns(HashMap::from([(column.to_string(), value)]))
    }

    #[test]
    fn decimal_getter_coerces_text_and_int() {
        let row = row_with("price", SqlValue::Text("129.99".into()));
        assert_eq!(row.decimal("price").unwrap().to_string(), "129.99");

        let row = row_with("price", SqlValue::Int(75));
        assert_eq!(row.decimal("price").unwrap(), Decimal::from(75));
    }

    #[test]
    fn float_getter_treats_null_as_zero() {
        let row = row_with("rank", SqlValue::Null);
        assert!((row.float("rank").unwrap() - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn text_array_flattens_nulls() {
        let row = row_with(
            "sizes",
            SqlValue::TextArray(vec![Some("9".into()), None, Some("10".into())]),
        );
        assert_eq!(row.text_array("sizes").unwrap(), vec!["9", "10"]);
    }

    #[test]
    fn missing_column_is_a_decode_error() {
        let row = Row::default();
        assert!(matches!(row.text("name"), Err(StoreError::Decode(_))));
    }

    #[test]
    fn timestamp_getter_parses_rfc3339_text() {
        let row = row_with("created_at", SqlValue::Text("2026-03-01T12:00:00Z".into()));
        let ts = row.timestamp("created_at").unwrap();
        assert_eq!(ts.timezone(), Utc);
    }

    #[test]
    fn sql_param_serializes_tagged() {
        let json = serde_json::to_value(SqlParam::Decimal(Some(Decimal::new(799, 2)))).unwrap();
        assert_eq!(json["type"], "decimal");
        let json = serde_json::to_value(SqlParam::Text(None)).unwrap();
        assert_eq!(json["type"], "text");
        assert!(json["value"].is_null());
    }

    #[test]
    fn json_values_map_to_sql_values() {
        assert_eq!(
            json_to_sql_value(serde_json::json!("a")),
            SqlValue::Text("a".into())
        );
        assert_eq!(json_to_sql_value(serde_json::json!(3)), SqlValue::Int(3));
        assert_eq!(
            json_to_sql_value(serde_json::json!(0.5)),
            SqlValue::Float(0.5)
        );
        assert_eq!(json_to_sql_value(serde_json::Value::Null), SqlValue::Null);
    }
}
