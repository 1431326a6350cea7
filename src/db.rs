//! 数据库模块
//!
//! # 设计思路
//!
//! 条目（记录来源）与图标（图标仓库）保存在同一个 SQLite 文件中，使用 `rusqlite` 直接操作。
//! `Database` 实现 `favicon::IconStore`，批处理收集循环通过它完成去重合并与关联。
//!
//! # 子模块
//!
//! - `schema`：建表与 `PRAGMA user_version` 迁移
//! - `entries`：条目导入与按选择范围加载
//! - `icons`：图标仓库实现与图标列表

use std::fs;
use std::path::Path;

use rusqlite::Connection;
use serde::Serialize;

use crate::error::AppError;
use crate::favicon::IconId;
use crate::record::RecordId;

mod entries;
mod icons;
mod schema;

/// 下载范围：全部条目、某个分组、或指定条目。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    All,
    Group(String),
    Entries(Vec<RecordId>),
}

/// 图标列表项
#[derive(Debug, Clone, Serialize)]
pub struct IconSummary {
    pub id: IconId,
    pub png_len: usize,
    /// 引用该图标的条目数
    pub referenced_by: i64,
    pub created_at: i64,
}

/// 数据库连接封装
pub struct Database {
    conn: Connection,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}

impl Database {
    /// 打开（必要时创建）数据库文件并初始化 Schema。
    pub fn open(db_path: &Path) -> Result<Self, AppError> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    AppError::Database(format!("创建数据库目录失败: {}", e))
                })?;
            }
        }
        log::info!("数据库路径: {}", db_path.display());

        let conn = Connection::open(db_path).map_err(|e| {
            AppError::Database(format!("打开数据库失败: {}", e))
        })?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, AppError> {
        let conn = Connection::open_in_memory().map_err(|e| {
            AppError::Database(format!("创建内存数据库失败: {}", e))
        })?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, AppError> {
        schema::initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }
}

pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
