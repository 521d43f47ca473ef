//! PostgreSQL query connector.
//!
//! Row-returning statements are wrapped so Postgres itself serializes the
//! rows to JSON; other statements report the number of affected rows.
//! Parameters are always bound, never spliced into the SQL text.

use async_trait::async_trait;
use serde_json::{Value as JsonValue, json};
use sqlx::postgres::{PgArguments, PgPool, PgPoolOptions};
use sqlx::query::Query;
use sqlx::{Postgres, Row};
use tracing::debug;
use weaver_workflow::{ActionConnector, ActionNodeConfig, ConnectorError, RunContext};

/// Runs `database_query` actions against a Postgres pool.
#[derive(Debug, Clone)]
pub struct PostgresConnector {
    pool: PgPool,
}

impl PostgresConnector {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates a pool that connects on first use.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the URL cannot be parsed.
    pub fn connect_lazy(url: &str) -> Result<Self, ConnectorError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect_lazy(url)
            .map_err(|e| ConnectorError::InvalidConfig {
                reason: e.to_string(),
            })?;
        Ok(Self::new(pool))
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// How a statement is sent to Postgres.
#[derive(Debug, PartialEq, Eq)]
enum Statement {
    /// Produces rows; the wrapped SQL aggregates them into one JSON array.
    Rows(String),
    /// Run as is; reports rows affected.
    Command,
}

const ROWS_ALIAS: &str = "weaver_rows";
const QUERY_KEYWORDS: [&str; 3] = ["select", "values", "table"];
const MODIFY_KEYWORDS: [&str; 3] = ["insert", "update", "delete"];

/// A bare word outside quotes and comments, with its parenthesis depth.
struct Word<'q> {
    text: &'q str,
    depth: usize,
    start: usize,
}

impl Word<'_> {
    fn is_any(&self, keywords: &[&str]) -> bool {
        keywords.iter().any(|kw| self.text.eq_ignore_ascii_case(kw))
    }
}

fn words(sql: &str) -> Vec<Word<'_>> {
    let bytes = sql.as_bytes();
    let mut words = Vec::new();
    let mut depth = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            quote @ (b'\'' | b'"') => {
                i += 1;
                while i < bytes.len() && bytes[i] != quote {
                    i += 1;
                }
                i += 1;
            }
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i = sql[i + 2..].find("*/").map_or(bytes.len(), |end| i + end + 4);
            }
            b'(' => {
                depth += 1;
                i += 1;
            }
            b')' => {
                depth = depth.saturating_sub(1);
                i += 1;
            }
            b if b.is_ascii_alphanumeric() || b == b'_' => {
                let start = i;
                while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                    i += 1;
                }
                words.push(Word {
                    text: &sql[start..i],
                    depth,
                    start,
                });
            }
            _ => i += 1,
        }
    }
    words
}

fn aggregate(from: &str) -> String {
    format!("SELECT COALESCE(json_agg({ROWS_ALIAS}), '[]'::json) FROM {from}")
}

/// Decides whether `query` produces rows and, if so, how to aggregate them.
///
/// A data-modifying statement cannot sit in a subquery, so row-returning
/// modifications become a CTE. A statement with its own `WITH` list gets
/// the result CTE appended to that list, since data-modifying CTEs must
/// stay at the top level.
fn classify(query: &str) -> Statement {
    let sql = query.trim().trim_end_matches(';').trim_end();
    let words = words(sql);
    let Some(first) = words.first() else {
        return Statement::Command;
    };
    let returning_after = |start: usize| {
        words
            .iter()
            .any(|w| w.depth == 0 && w.start > start && w.text.eq_ignore_ascii_case("returning"))
    };

    if first.text.eq_ignore_ascii_case("with") {
        let main = words.iter().skip(1).find(|w| {
            w.depth == 0 && (w.is_any(&QUERY_KEYWORDS) || w.is_any(&MODIFY_KEYWORDS))
        });
        return match main {
            Some(main) if main.is_any(&QUERY_KEYWORDS) || returning_after(main.start) => {
                let ctes = sql[..main.start].trim_end();
                let body = &sql[main.start..];
                let aggregated = aggregate(ROWS_ALIAS);
                Statement::Rows(format!("{ctes}, {ROWS_ALIAS} AS ({body}) {aggregated}"))
            }
            _ => Statement::Command,
        };
    }

    if first.is_any(&QUERY_KEYWORDS) {
        Statement::Rows(aggregate(&format!("({sql}) {ROWS_ALIAS}")))
    } else if returning_after(first.start) {
        Statement::Rows(format!("WITH {ROWS_ALIAS} AS ({sql}) {}", aggregate(ROWS_ALIAS)))
    } else {
        Statement::Command
    }
}

fn bind_all<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    params: Vec<JsonValue>,
) -> Query<'q, Postgres, PgArguments> {
    for param in params {
        query = match param {
            JsonValue::Null => query.bind(None::<String>),
            JsonValue::Bool(b) => query.bind(b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => query.bind(i),
                None => query.bind(n.as_f64()),
            },
            JsonValue::String(s) => query.bind(s),
            other => query.bind(sqlx::types::Json(other)),
        };
    }
    query
}

fn query_error(e: sqlx::Error) -> ConnectorError {
    match e {
        sqlx::Error::Database(db) => ConnectorError::QueryFailed {
            reason: db.to_string(),
        },
        other => ConnectorError::ConnectionFailed {
            reason: other.to_string(),
        },
    }
}

#[async_trait]
impl ActionConnector for PostgresConnector {
    async fn execute(
        &self,
        config: &ActionNodeConfig,
        ctx: &RunContext,
    ) -> Result<JsonValue, ConnectorError> {
        let ActionNodeConfig::DatabaseQuery { query, parameters } = config else {
            return Err(ConnectorError::Unsupported {
                subtype: config.subtype(),
            });
        };

        let params: Vec<JsonValue> = parameters.iter().map(|p| ctx.render_json(p)).collect();
        debug!(params = params.len(), "running database query");

        match classify(query) {
            Statement::Rows(sql) => {
                let row = bind_all(sqlx::query(&sql), params)
                    .fetch_one(&self.pool)
                    .await
                    .map_err(query_error)?;
                let rows: JsonValue = row.try_get(0).map_err(query_error)?;
                let row_count = rows.as_array().map_or(0, Vec::len);
                Ok(json!({ "rows": rows, "row_count": row_count }))
            }
            Statement::Command => {
                let result = bind_all(sqlx::query(query), params)
                    .execute(&self.pool)
                    .await
                    .map_err(query_error)?;
                Ok(json!({ "rows_affected": result.rows_affected() }))
            }
        }
    }
}
