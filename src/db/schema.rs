//! Schema 初始化子模块
//!
//! ## 职责
//! - 创建/迁移 `entries` 与 `icons` 表结构和索引
//! - 设置 SQLite 运行参数（WAL、外键）
//!
//! ## 错误语义
//! - DDL 失败统一映射为 `AppError::Database`

use rusqlite::Connection;

use crate::error::AppError;

const SCHEMA_VERSION: i64 = 2;

fn get_user_version(conn: &Connection) -> Result<i64, AppError> {
    conn.query_row("PRAGMA user_version", [], |row| row.get(0))
        .map_err(|e| AppError::Database(format!("读取数据库版本失败: {}", e)))
}

fn set_user_version(conn: &Connection, version: i64) -> Result<(), AppError> {
    conn.execute_batch(&format!("PRAGMA user_version = {version};"))
        .map_err(|e| AppError::Database(format!("写入数据库版本失败: {}", e)))
}

fn create_base_tables(conn: &Connection) -> Result<(), AppError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS icons (
            id TEXT PRIMARY KEY,
            png BLOB NOT NULL,
            created_at INTEGER NOT NULL
        );
        CREATE TABLE IF NOT EXISTS entries (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL DEFAULT '',
            url TEXT NOT NULL DEFAULT '',
            group_name TEXT,
            icon_id TEXT REFERENCES icons(id) ON DELETE SET NULL,
            modified_at INTEGER NOT NULL
        );"
    ).map_err(|e| AppError::Database(format!("创建基础表失败: {}", e)))?;

    conn.execute_batch(
        "CREATE INDEX IF NOT EXISTS idx_entries_group ON entries(group_name);
         CREATE INDEX IF NOT EXISTS idx_entries_icon ON entries(icon_id);"
    ).map_err(|e| AppError::Database(format!("创建基础索引失败: {}", e)))
}

/// v2：保存 Title/URL 以外的自定义字段（JSON 对象）。
fn add_entry_fields_column(conn: &Connection) -> Result<(), AppError> {
    let exists: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM pragma_table_info('entries') WHERE name = 'fields'",
            [],
            |row| row.get(0),
        )
        .map_err(|e| AppError::Database(format!("读取表结构失败: {}", e)))?;
    if exists > 0 {
        return Ok(());
    }
    conn.execute_batch("ALTER TABLE entries ADD COLUMN fields TEXT NOT NULL DEFAULT '{}';")
        .map_err(|e| AppError::Database(format!("执行 v2 条目字段迁移失败: {}", e)))
}

pub(super) fn initialize_schema(conn: &Connection) -> Result<(), AppError> {
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
        .ok();

    create_base_tables(conn)?;

    let mut version = get_user_version(conn)?;
    if version < 1 {
        set_user_version(conn, 1)?;
        version = 1;
    }

    if version < 2 {
        add_entry_fields_column(conn)?;
        set_user_version(conn, 2)?;
        version = 2;
    }

    if version != SCHEMA_VERSION {
        return Err(AppError::Database(format!(
            "数据库版本不匹配: current={}, expected={}",
            version, SCHEMA_VERSION
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use rusqlite::Connection;

    use super::{SCHEMA_VERSION, get_user_version, initialize_schema};

    #[test]
    fn initialize_schema_is_idempotent() {
        let conn = Connection::open_in_memory().expect("create memory db");

        initialize_schema(&conn).expect("first init should succeed");
        initialize_schema(&conn).expect("second init should succeed");

        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name IN ('entries', 'icons')",
                [],
                |row| row.get(0),
            )
            .expect("query table count");
        assert_eq!(tables, 2);
        assert_eq!(get_user_version(&conn).expect("version"), SCHEMA_VERSION);
    }

    #[test]
    fn v1_database_gains_fields_column() {
        let conn = Connection::open_in_memory().expect("create memory db");
        conn.execute_batch(
            "CREATE TABLE entries (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL DEFAULT '',
                url TEXT NOT NULL DEFAULT '',
                group_name TEXT,
                icon_id TEXT,
                modified_at INTEGER NOT NULL
             );
             INSERT INTO entries (id, title, url, modified_at) VALUES ('e1', 'Example', 'example.com', 1);
             PRAGMA user_version = 1;",
        )
        .expect("create v1 schema");

        initialize_schema(&conn).expect("migrate");

        let fields: String = conn
            .query_row("SELECT fields FROM entries WHERE id = 'e1'", [], |row| row.get(0))
            .expect("query migrated row");
        assert_eq!(fields, "{}");
    }

    #[test]
    fn newer_database_is_rejected() {
        let conn = Connection::open_in_memory().expect("create memory db");
        conn.execute_batch("PRAGMA user_version = 99;").expect("set version");

        let err = initialize_schema(&conn).expect_err("should reject");
        assert!(err.to_string().contains("current=99"));
    }
}
