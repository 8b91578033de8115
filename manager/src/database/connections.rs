//! Connection CRUD database operations.

use anyhow::Result;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::records::ConnectionRecord;
use super::Database;
use crate::connection::ConnectionState;

const CONNECTION_COLUMNS: &str = r#"
    id, workspace_id, name, host, port, database, username, password, tls,
    ca_cert, prefix, status, last_error, created_at, updated_at
"#;

fn connection_from_row(row: &SqliteRow) -> Result<ConnectionRecord> {
    Ok(ConnectionRecord {
        id: row.try_get("id")?,
        workspace_id: row.try_get("workspace_id")?,
        name: row.try_get("name")?,
        host: row.try_get("host")?,
        port: row.try_get("port")?,
        database: row.try_get("database")?,
        username: row.try_get("username")?,
        password: row.try_get("password")?,
        tls: row.try_get("tls")?,
        ca_cert: row.try_get("ca_cert")?,
        prefix: row.try_get("prefix")?,
        status: row.try_get("status")?,
        last_error: row.try_get("last_error")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

impl Database {
    pub async fn get_all_connections(&self) -> Result<Vec<ConnectionRecord>> {
        let sql = format!("SELECT {} FROM connections ORDER BY name, id", CONNECTION_COLUMNS);
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

        let mut connections = Vec::with_capacity(rows.len());
        for row in rows {
            connections.push(connection_from_row(&row)?);
        }
        Ok(connections)
    }

    pub async fn get_connection_by_id(&self, id: &str) -> Result<Option<ConnectionRecord>> {
        let sql = format!("SELECT {} FROM connections WHERE id = ?", CONNECTION_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(connection_from_row).transpose()
    }

    /// Insert or replace the definition of a connection
    ///
    /// Status columns are left untouched on update; they belong to the
    /// status mirror.
    pub async fn upsert_connection(&self, connection: &ConnectionRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO connections (id, workspace_id, name, host, port, database, username,
                                     password, tls, ca_cert, prefix, status, last_error,
                                     created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                workspace_id = excluded.workspace_id,
                name = excluded.name,
                host = excluded.host,
                port = excluded.port,
                database = excluded.database,
                username = excluded.username,
                password = excluded.password,
                tls = excluded.tls,
                ca_cert = excluded.ca_cert,
                prefix = excluded.prefix,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&connection.id)
        .bind(&connection.workspace_id)
        .bind(&connection.name)
        .bind(&connection.host)
        .bind(connection.port)
        .bind(connection.database)
        .bind(&connection.username)
        .bind(&connection.password)
        .bind(connection.tls)
        .bind(&connection.ca_cert)
        .bind(&connection.prefix)
        .bind(&connection.status)
        .bind(&connection.last_error)
        .bind(connection.created_at)
        .bind(connection.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Returns false when no connection with `id` exists
    pub async fn delete_connection(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM connections WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn update_connection_status(
        &self,
        id: &str,
        state: ConnectionState,
        last_error: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE connections SET status = ?, last_error = ?, updated_at = ? WHERE id = ?",
        )
        .bind(state.as_str())
        .bind(last_error)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
