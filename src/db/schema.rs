//! Schema introspection module.
//!
//! This module backs the metadata tools (`show_tables`, `show_databases`,
//! `describe_table`) for MySQL and SQLite.
//!
//! # Architecture
//!
//! SQL queries are organized in the `queries` submodule with constants for each
//! database type. Database-specific implementations are in their respective
//! submodules (mysql, sqlite), each providing the same interface.

use crate::db::connection::DbConnection;
use crate::error::{DbError, DbResult};
use crate::models::{ColumnDescription, KeyKind};
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

/// Schema inspector for database introspection.
#[derive(Debug, Clone, Copy)]
pub struct SchemaInspector {
    query_timeout: Duration,
}

impl SchemaInspector {
    pub fn new(query_timeout: Duration) -> Self {
        Self { query_timeout }
    }

    /// List base tables in the current database, sorted by name.
    pub async fn list_tables(&self, conn: &mut DbConnection) -> DbResult<Vec<String>> {
        match conn {
            DbConnection::MySql(c) => self.bounded("list tables", mysql::list_tables(c)).await,
            DbConnection::SQLite(c) => self.bounded("list tables", sqlite::list_tables(c)).await,
        }
    }

    /// List databases visible to the connection.
    ///
    /// For SQLite these are the attached schemas (`main`, `temp`, ...).
    pub async fn list_databases(&self, conn: &mut DbConnection) -> DbResult<Vec<String>> {
        match conn {
            DbConnection::MySql(c) => {
                self.bounded("list databases", mysql::list_databases(c))
                    .await
            }
            DbConnection::SQLite(c) => {
                self.bounded("list databases", sqlite::list_databases(c))
                    .await
            }
        }
    }

    /// Database that unqualified table names resolve to, if one is selected.
    pub async fn current_database(&self, conn: &mut DbConnection) -> DbResult<Option<String>> {
        match conn {
            DbConnection::MySql(c) => {
                self.bounded("current database", mysql::current_database(c))
                    .await
            }
            // Unqualified names always resolve against the main schema
            DbConnection::SQLite(_) => Ok(Some(sqlite::MAIN_SCHEMA.to_string())),
        }
    }

    /// Describe a table's columns in ordinal order.
    pub async fn describe_table(
        &self,
        conn: &mut DbConnection,
        table_name: &str,
    ) -> DbResult<Vec<ColumnDescription>> {
        let columns = match conn {
            DbConnection::MySql(c) => {
                self.bounded("describe table", mysql::describe_table(c, table_name))
                    .await?
            }
            DbConnection::SQLite(c) => {
                self.bounded("describe table", sqlite::describe_table(c, table_name))
                    .await?
            }
        };

        if columns.is_empty() {
            return Err(DbError::query(
                format!("Table '{}' not found", table_name),
                None,
                "Use show_tables to list available tables",
            ));
        }
        Ok(columns)
    }

    async fn bounded<T>(
        &self,
        operation: &str,
        fut: impl Future<Output = DbResult<T>>,
    ) -> DbResult<T> {
        match timeout(self.query_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(DbError::timeout(operation, self.query_timeout.as_secs())),
        }
    }
}

// =============================================================================
// SQL Queries
// =============================================================================

mod queries {
    pub mod mysql {
        pub const LIST_TABLES: &str = "SHOW TABLES";

        pub const LIST_DATABASES: &str = "SHOW DATABASES";

        pub const CURRENT_DATABASE: &str = "SELECT DATABASE()";

        pub const DESCRIBE_COLUMNS: &str = r#"
        SELECT
            CONVERT(COLUMN_NAME USING utf8) AS COLUMN_NAME,
            CONVERT(COLUMN_TYPE USING utf8) AS COLUMN_TYPE,
            CONVERT(IS_NULLABLE USING utf8) AS IS_NULLABLE,
            CONVERT(COLUMN_DEFAULT USING utf8) AS COLUMN_DEFAULT,
            CONVERT(COLUMN_KEY USING utf8) AS COLUMN_KEY,
            CONVERT(EXTRA USING utf8) AS EXTRA
        FROM information_schema.columns
        WHERE TABLE_NAME = ? AND TABLE_SCHEMA = DATABASE()
        ORDER BY ORDINAL_POSITION
        "#;
    }

    pub mod sqlite {
        pub const LIST_TABLES: &str = r#"
            SELECT name FROM sqlite_master
            WHERE type = 'table'
            AND name NOT LIKE 'sqlite_%'
            ORDER BY name
            "#;

        pub const LIST_DATABASES: &str = "SELECT name FROM pragma_database_list ORDER BY seq";

        pub const TABLE_INFO: &str = r#"
            SELECT name, type, "notnull" AS not_null, dflt_value, pk
            FROM pragma_table_info(?)
            ORDER BY cid
            "#;

        pub const INDEX_LIST: &str = r#"SELECT name, "unique" AS is_unique FROM pragma_index_list(?)"#;

        pub const INDEX_INFO: &str = "SELECT name FROM pragma_index_info(?) ORDER BY seqno";
    }
}

// =============================================================================
// Database-Specific Implementations
// =============================================================================

mod mysql {
    use super::*;
    use sqlx::mysql::{MySqlConnection, MySqlRow};
    use sqlx::{Executor, Row};

    /// Safely get a string from a MySQL row.
    /// MySQL may return VARBINARY instead of VARCHAR depending on charset configuration.
    fn get_string(row: &MySqlRow, column: &str) -> String {
        get_optional_string(row, column).unwrap_or_default()
    }

    /// Safely get an optional string from a MySQL row.
    fn get_optional_string(row: &MySqlRow, column: &str) -> Option<String> {
        row.try_get::<Option<String>, _>(column)
            .ok()
            .flatten()
            .or_else(|| {
                row.try_get::<Option<Vec<u8>>, _>(column)
                    .ok()
                    .flatten()
                    .and_then(|bytes| String::from_utf8(bytes).ok())
            })
    }

    /// Safely get a string from a MySQL row by index.
    fn get_string_by_index(row: &MySqlRow, index: usize) -> Option<String> {
        row.try_get::<String, _>(index).ok().or_else(|| {
            row.try_get::<Vec<u8>, _>(index)
                .ok()
                .and_then(|bytes| String::from_utf8(bytes).ok())
        })
    }

    async fn first_column(conn: &mut MySqlConnection, sql: &str) -> DbResult<Vec<String>> {
        let rows = (&mut *conn).fetch_all(sql).await?;
        Ok(rows
            .iter()
            .filter_map(|row| get_string_by_index(row, 0))
            .collect())
    }

    pub async fn list_tables(conn: &mut MySqlConnection) -> DbResult<Vec<String>> {
        let mut tables = first_column(conn, queries::mysql::LIST_TABLES).await?;
        tables.sort();
        debug!(count = tables.len(), "Listed MySQL tables");
        Ok(tables)
    }

    pub async fn list_databases(conn: &mut MySqlConnection) -> DbResult<Vec<String>> {
        // SHOW DATABASES returns a single column "Database"
        let databases = first_column(conn, queries::mysql::LIST_DATABASES).await?;
        debug!(count = databases.len(), "Listed MySQL databases");
        Ok(databases)
    }

    /// NULL (no default schema selected) becomes `None`.
    pub async fn current_database(conn: &mut MySqlConnection) -> DbResult<Option<String>> {
        let current = first_column(conn, queries::mysql::CURRENT_DATABASE).await?;
        Ok(current.into_iter().next())
    }

    pub async fn describe_table(
        conn: &mut MySqlConnection,
        table_name: &str,
    ) -> DbResult<Vec<ColumnDescription>> {
        let rows = sqlx::query(queries::mysql::DESCRIBE_COLUMNS)
            .bind(table_name)
            .fetch_all(&mut *conn)
            .await?;

        Ok(rows
            .iter()
            .map(|row| ColumnDescription {
                name: get_string(row, "COLUMN_NAME"),
                data_type: get_string(row, "COLUMN_TYPE"),
                nullable: get_string(row, "IS_NULLABLE") == "YES",
                key: KeyKind::from_mysql(&get_string(row, "COLUMN_KEY")),
                default: get_optional_string(row, "COLUMN_DEFAULT"),
                extra: get_optional_string(row, "EXTRA").filter(|e| !e.is_empty()),
            })
            .collect())
    }
}

mod sqlite {
    use super::*;
    use sqlx::sqlite::SqliteConnection;
    use sqlx::{Executor, Row};
    use std::collections::{HashMap, HashSet};

    pub const MAIN_SCHEMA: &str = "main";

    pub async fn list_tables(conn: &mut SqliteConnection) -> DbResult<Vec<String>> {
        let rows = (&mut *conn).fetch_all(queries::sqlite::LIST_TABLES).await?;
        let tables: Vec<String> = rows.iter().map(|row| row.get("name")).collect();
        debug!(count = tables.len(), "Listed SQLite tables");
        Ok(tables)
    }

    pub async fn list_databases(conn: &mut SqliteConnection) -> DbResult<Vec<String>> {
        let rows = (&mut *conn)
            .fetch_all(queries::sqlite::LIST_DATABASES)
            .await?;
        Ok(rows.iter().map(|row| row.get("name")).collect())
    }

    pub async fn describe_table(
        conn: &mut SqliteConnection,
        table_name: &str,
    ) -> DbResult<Vec<ColumnDescription>> {
        let rows = sqlx::query(queries::sqlite::TABLE_INFO)
            .bind(table_name)
            .fetch_all(&mut *conn)
            .await?;
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let index_keys = fetch_index_keys(conn, table_name).await;

        Ok(rows
            .iter()
            .map(|row| {
                let name: String = row.get("name");
                let not_null: i64 = row.get("not_null");
                let pk: i64 = row.get("pk");
                let key = if pk > 0 {
                    KeyKind::Primary
                } else {
                    index_keys.get(&name).copied().unwrap_or_default()
                };

                ColumnDescription {
                    data_type: row.try_get("type").unwrap_or_default(),
                    nullable: not_null == 0,
                    key,
                    default: row.try_get("dflt_value").ok().flatten(),
                    extra: None,
                    name,
                }
            })
            .collect())
    }

    /// Map columns to the key kind MySQL would report: UNI for a single-column
    /// unique index, MUL for the leading column of any other index.
    async fn fetch_index_keys(
        conn: &mut SqliteConnection,
        table_name: &str,
    ) -> HashMap<String, KeyKind> {
        let indexes = sqlx::query(queries::sqlite::INDEX_LIST)
            .bind(table_name)
            .fetch_all(&mut *conn)
            .await
            .unwrap_or_default();

        let mut unique = HashSet::new();
        let mut leading = HashSet::new();
        for idx_row in &indexes {
            let index_name: String = idx_row.get("name");
            let is_unique: i64 = idx_row.get("is_unique");

            let columns: Vec<String> = sqlx::query(queries::sqlite::INDEX_INFO)
                .bind(&index_name)
                .fetch_all(&mut *conn)
                .await
                .unwrap_or_default()
                .iter()
                .filter_map(|row| row.try_get::<Option<String>, _>("name").ok().flatten())
                .collect();

            match columns.as_slice() {
                [single] if is_unique != 0 => {
                    unique.insert(single.clone());
                }
                [first, ..] => {
                    leading.insert(first.clone());
                }
                [] => {}
            }
        }

        let mut keys: HashMap<String, KeyKind> =
            leading.into_iter().map(|c| (c, KeyKind::Index)).collect();
        keys.extend(unique.into_iter().map(|c| (c, KeyKind::Unique)));
        keys
    }
}
