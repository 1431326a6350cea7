//! 图标子模块：`IconStore` 的 SQLite 实现与图标列表。

use rusqlite::{OptionalExtension, params};

use crate::error::AppError;
use crate::favicon::{IconAsset, IconId, IconStore};
use crate::record::RecordId;

use super::{Database, IconSummary, now_millis};

impl Database {
    /// 列出全部图标及其引用条目数，按创建顺序。
    pub fn list_icons(&self) -> Result<Vec<(IconSummary, IconAsset)>, AppError> {
        let mut stmt = self
            .conn()
            .prepare(
                "SELECT i.id, i.png, i.created_at,
                        (SELECT COUNT(*) FROM entries e WHERE e.icon_id = i.id)
                 FROM icons i
                 ORDER BY i.rowid",
            )
            .map_err(|e| AppError::Database(format!("准备图标查询失败: {}", e)))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Vec<u8>>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            })
            .map_err(|e| AppError::Database(format!("查询图标失败: {}", e)))?;

        let mut icons = Vec::new();
        for row in rows {
            let (id, png, created_at, referenced_by) =
                row.map_err(|e| AppError::Database(format!("读取图标失败: {}", e)))?;
            let summary = IconSummary {
                id: id.parse()?,
                png_len: png.len(),
                referenced_by,
                created_at,
            };
            icons.push((summary.clone(), IconAsset { id: summary.id, png }));
        }
        Ok(icons)
    }

    /// 条目当前关联的图标。
    pub fn icon_of(&self, record: &RecordId) -> Result<Option<IconId>, AppError> {
        let icon: Option<Option<String>> = self
            .conn()
            .query_row(
                "SELECT icon_id FROM entries WHERE id = ?1",
                params![record.0],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| AppError::Database(format!("查询条目图标失败: {}", e)))?;
        icon.flatten().as_deref().map(str::parse::<IconId>).transpose()
    }
}

impl IconStore for Database {
    fn icons(&self) -> Result<Vec<IconAsset>, AppError> {
        let mut stmt = self
            .conn()
            .prepare("SELECT id, png FROM icons ORDER BY rowid")
            .map_err(|e| AppError::Store(format!("准备图标查询失败: {}", e)))?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?)))
            .map_err(|e| AppError::Store(format!("查询图标失败: {}", e)))?;

        let mut assets = Vec::new();
        for row in rows {
            let (id, png) = row.map_err(|e| AppError::Store(format!("读取图标失败: {}", e)))?;
            assets.push(IconAsset { id: id.parse()?, png });
        }
        Ok(assets)
    }

    fn add_icon(&mut self, png: Vec<u8>) -> Result<IconId, AppError> {
        let id = IconId::new();
        self.conn()
            .execute(
                "INSERT INTO icons (id, png, created_at) VALUES (?1, ?2, ?3)",
                params![id.to_string(), png, now_millis()],
            )
            .map_err(|e| AppError::Store(format!("写入图标失败: {}", e)))?;
        log::debug!("新增图标 {}（{} bytes）", id, png.len());
        Ok(id)
    }

    /// 关联图标并刷新条目修改时间。
    fn assign_icon(&mut self, record: &RecordId, icon: IconId) -> Result<(), AppError> {
        let updated = self
            .conn()
            .execute(
                "UPDATE entries SET icon_id = ?1, modified_at = ?2 WHERE id = ?3",
                params![icon.to_string(), now_millis(), record.0],
            )
            .map_err(|e| AppError::Store(format!("关联图标失败: {}", e)))?;
        if updated == 0 {
            return Err(AppError::Store(format!("条目不存在: {}", record)));
        }
        Ok(())
    }
}
