//! Builtin operations backed by SQLite databases under the sandbox root.

use anyhow::Context;
use async_trait::async_trait;
use serde_json::{json, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteRow};
use sqlx::{ConnectOptions, Connection, Row, TypeInfo, ValueRef};
use tracing::info;

use super::write_output;
use crate::operations::{Operation, OperationContext};

/// Opens an existing database read-only.
async fn open_read_only(db_path: &str) -> anyhow::Result<SqliteConnection> {
    SqliteConnectOptions::new()
        .filename(db_path)
        .read_only(true)
        .create_if_missing(false)
        .connect()
        .await
        .with_context(|| format!("Cannot open database {db_path}"))
}

/// Converts one column of a row into JSON based on its runtime storage class.
fn column_to_json(row: &SqliteRow, index: usize) -> anyhow::Result<Value> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let type_name = raw.type_info().name().to_string();

    let value = match type_name.as_str() {
        "INTEGER" => json!(row.try_get::<i64, _>(index)?),
        "REAL" => json!(row.try_get::<f64, _>(index)?),
        "BLOB" => {
            let bytes: Vec<u8> = row.try_get(index)?;
            json!(String::from_utf8_lossy(&bytes))
        }
        _ => json!(row.try_get::<String, _>(index)?),
    };
    Ok(value)
}

fn row_to_json(row: &SqliteRow) -> anyhow::Result<Value> {
    let values = (0..row.len())
        .map(|i| column_to_json(row, i))
        .collect::<anyhow::Result<Vec<_>>>()?;
    Ok(Value::Array(values))
}

// ── sql_query ────────────────────────────────────────────

/// Runs the configured query and writes all rows as a JSON array of arrays.
pub struct SqlQueryOperation {
    db_path: String,
    query: String,
    output: String,
}

impl SqlQueryOperation {
    pub fn new(
        db_path: impl Into<String>,
        query: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        Self {
            db_path: db_path.into(),
            query: query.into(),
            output: output.into(),
        }
    }
}

#[async_trait]
impl Operation for SqlQueryOperation {
    fn name(&self) -> &str {
        "sql_query"
    }

    fn keyword(&self) -> &str {
        "SQL query"
    }

    fn description(&self) -> &str {
        "Run the configured SQL query against a SQLite database and save the rows as JSON."
    }

    async fn execute(&self, context: &OperationContext<'_>) -> anyhow::Result<String> {
        context.sandbox.validate_all(&[self.db_path.as_str(), self.output.as_str()])?;

        let mut conn = open_read_only(&self.db_path).await?;
        let rows = sqlx::query(&self.query)
            .fetch_all(&mut conn)
            .await
            .context("SQL execution failed")?;
        conn.close().await.ok();

        let table = rows.iter().map(row_to_json).collect::<anyhow::Result<Vec<_>>>()?;
        let body = serde_json::to_vec(&table)?;
        write_output(&self.output, &body).await?;

        info!("SQL query returned {} rows into {}", table.len(), self.output);
        Ok("Query executed successfully.".to_string())
    }
}

// ── ticket_sales ─────────────────────────────────────────

/// Sums `units * price` over the `tickets` table for one ticket type.
pub struct TicketSalesOperation {
    db_path: String,
    ticket_type: String,
    output: String,
}

impl TicketSalesOperation {
    pub fn new(
        db_path: impl Into<String>,
        ticket_type: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        Self {
            db_path: db_path.into(),
            ticket_type: ticket_type.into(),
            output: output.into(),
        }
    }
}

#[async_trait]
impl Operation for TicketSalesOperation {
    fn name(&self) -> &str {
        "ticket_sales"
    }

    fn keyword(&self) -> &str {
        "ticket sales"
    }

    fn description(&self) -> &str {
        "Compute total sales for one ticket type and save the figure."
    }

    async fn execute(&self, context: &OperationContext<'_>) -> anyhow::Result<String> {
        context.sandbox.validate_all(&[self.db_path.as_str(), self.output.as_str()])?;

        let mut conn = open_read_only(&self.db_path).await?;
        let row = sqlx::query("SELECT SUM(units * price) FROM tickets WHERE type = ?")
            .bind(self.ticket_type.as_str())
            .fetch_one(&mut conn)
            .await
            .context("SQL execution failed")?;
        let total = match column_to_json(&row, 0)? {
            Value::Null => "0".to_string(),
            Value::String(s) => s,
            other => other.to_string(),
        };
        conn.close().await.ok();

        write_output(&self.output, total.as_bytes()).await?;
        Ok(format!("Total {} ticket sales: {total}", self.ticket_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DispatchError;
    use crate::test_support::sandbox_in;

    async fn create_tickets_db(path: &str) {
        let mut conn = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .connect()
            .await
            .unwrap();
        sqlx::query("CREATE TABLE tickets (type TEXT, units INTEGER, price REAL)")
            .execute(&mut conn)
            .await
            .unwrap();
        for (kind, units, price) in [("Gold", 2, 10.5), ("Gold", 1, 20.0), ("Silver", 5, 3.0)] {
            sqlx::query("INSERT INTO tickets VALUES (?, ?, ?)")
                .bind(kind)
                .bind(units)
                .bind(price)
                .execute(&mut conn)
                .await
                .unwrap();
        }
        sqlx::query("CREATE TABLE notes (id INTEGER, body TEXT, extra BLOB)")
            .execute(&mut conn)
            .await
            .unwrap();
        sqlx::query("INSERT INTO notes VALUES (1, 'hello', NULL)")
            .execute(&mut conn)
            .await
            .unwrap();
        conn.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_sql_query_writes_rows_as_json() {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = sandbox_in(dir.path());
        let db = format!("{}/database.db", dir.path().display());
        let output = format!("{}/query_output.json", dir.path().display());
        create_tickets_db(&db).await;

        let op = SqlQueryOperation::new(&db, "SELECT id, body, extra FROM notes", &output);
        let context = OperationContext { sandbox: &sandbox, task: "run SQL query" };
        assert_eq!(op.execute(&context).await.unwrap(), "Query executed successfully.");

        let written: Value = serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
        assert_eq!(written, json!([[1, "hello", null]]));
    }

    #[tokio::test]
    async fn test_sql_query_invalid_sql() {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = sandbox_in(dir.path());
        let db = format!("{}/database.db", dir.path().display());
        let output = format!("{}/out.json", dir.path().display());
        create_tickets_db(&db).await;

        let op = SqlQueryOperation::new(&db, "SELEKT nonsense", &output);
        let context = OperationContext { sandbox: &sandbox, task: "SQL query" };
        let err = op.execute(&context).await.unwrap_err();
        assert!(err.to_string().contains("SQL execution failed"));
    }

    #[tokio::test]
    async fn test_sql_query_missing_database() {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = sandbox_in(dir.path());
        let db = format!("{}/absent.db", dir.path().display());
        let output = format!("{}/out.json", dir.path().display());

        let op = SqlQueryOperation::new(&db, "SELECT 1", &output);
        let context = OperationContext { sandbox: &sandbox, task: "SQL query" };
        let err = op.execute(&context).await.unwrap_err();
        assert!(err.to_string().contains("Cannot open database"));
    }

    #[tokio::test]
    async fn test_sql_query_db_outside_sandbox() {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = sandbox_in(dir.path());
        let output = format!("{}/out.json", dir.path().display());

        let op = SqlQueryOperation::new("/etc/app.db", "SELECT 1", &output);
        let context = OperationContext { sandbox: &sandbox, task: "SQL query" };
        let err = op.execute(&context).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DispatchError>(),
            Some(DispatchError::AccessDenied(_))
        ));
    }

    #[tokio::test]
    async fn test_ticket_sales_total() {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = sandbox_in(dir.path());
        let db = format!("{}/ticket-sales.db", dir.path().display());
        let output = format!("{}/ticket-sales-gold.txt", dir.path().display());
        create_tickets_db(&db).await;

        let op = TicketSalesOperation::new(&db, "Gold", &output);
        let context = OperationContext { sandbox: &sandbox, task: "ticket sales" };
        let message = op.execute(&context).await.unwrap();

        assert_eq!(message, "Total Gold ticket sales: 41.0");
        assert_eq!(std::fs::read_to_string(&output).unwrap(), "41.0");
    }

    #[tokio::test]
    async fn test_ticket_sales_unknown_type_is_zero() {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = sandbox_in(dir.path());
        let db = format!("{}/ticket-sales.db", dir.path().display());
        let output = format!("{}/total.txt", dir.path().display());
        create_tickets_db(&db).await;

        let op = TicketSalesOperation::new(&db, "Platinum", &output);
        let context = OperationContext { sandbox: &sandbox, task: "ticket sales" };
        op.execute(&context).await.unwrap();
        assert_eq!(std::fs::read_to_string(&output).unwrap(), "0");
    }
}
