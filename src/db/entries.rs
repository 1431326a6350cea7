//! 条目子模块
//!
//! `Title`/`URL` 存为独立列，其余字段以 JSON 对象存入 `fields` 列。
//! 加载顺序即导入顺序（`rowid`），指定条目时按调用方给出的顺序返回。

use std::collections::HashMap;

use rusqlite::{OptionalExtension, Row, params};

use crate::error::AppError;
use crate::favicon::IconId;
use crate::record::{FIELD_TITLE, FIELD_URL, Record, RecordId};

use super::{Database, Selection, now_millis};

const ENTRY_COLUMNS: &str = "id, title, url, group_name, icon_id, fields";

/// 查询行的原始值，转换为 `Record` 时才解析 JSON 与图标标识。
struct EntryRow {
    id: String,
    title: String,
    url: String,
    group_name: Option<String>,
    icon_id: Option<String>,
    fields: String,
}

impl EntryRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            title: row.get(1)?,
            url: row.get(2)?,
            group_name: row.get(3)?,
            icon_id: row.get(4)?,
            fields: row.get(5)?,
        })
    }

    fn into_record(self) -> Result<Record, AppError> {
        let mut fields: HashMap<String, String> = serde_json::from_str(&self.fields)
            .map_err(|e| AppError::Database(format!("解析条目 {} 的字段失败: {}", self.id, e)))?;
        fields.insert(FIELD_TITLE.to_string(), self.title);
        fields.insert(FIELD_URL.to_string(), self.url);

        let icon = self
            .icon_id
            .as_deref()
            .map(str::parse::<IconId>)
            .transpose()?;

        Ok(Record {
            id: RecordId(self.id),
            group: self.group_name,
            fields,
            icon,
        })
    }
}

impl Database {
    /// 导入（或更新）条目，返回写入条数。
    ///
    /// 已存在的条目保留原有图标关联，除非导入数据显式给出了图标。
    pub fn import_records(&mut self, records: &[Record]) -> Result<usize, AppError> {
        let tx = self
            .conn
            .transaction()
            .map_err(|e| AppError::Database(format!("开始导入事务失败: {}", e)))?;

        let now = now_millis();
        for record in records {
            let extra: HashMap<&str, &str> = record
                .fields
                .iter()
                .filter(|(name, _)| name.as_str() != FIELD_TITLE && name.as_str() != FIELD_URL)
                .map(|(name, value)| (name.as_str(), value.as_str()))
                .collect();
            let extra = serde_json::to_string(&extra)
                .map_err(|e| AppError::Database(format!("序列化条目字段失败: {}", e)))?;

            tx.execute(
                "INSERT INTO entries (id, title, url, group_name, icon_id, fields, modified_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(id) DO UPDATE SET
                    title = excluded.title,
                    url = excluded.url,
                    group_name = excluded.group_name,
                    icon_id = COALESCE(excluded.icon_id, entries.icon_id),
                    fields = excluded.fields,
                    modified_at = excluded.modified_at",
                params![
                    record.id.0,
                    record.title(),
                    record.url(),
                    record.group,
                    record.icon.map(|id| id.to_string()),
                    extra,
                    now
                ],
            )
            .map_err(|e| AppError::Database(format!("导入条目 {} 失败: {}", record.id, e)))?;
        }

        tx.commit()
            .map_err(|e| AppError::Database(format!("提交导入事务失败: {}", e)))?;

        log::info!("📥 导入 {} 条记录", records.len());
        Ok(records.len())
    }

    /// 按选择范围加载条目。
    pub fn load_records(&self, selection: &Selection) -> Result<Vec<Record>, AppError> {
        match selection {
            Selection::All => self.query_entries(
                &format!("SELECT {ENTRY_COLUMNS} FROM entries ORDER BY rowid"),
                params![],
            ),
            Selection::Group(group) => self.query_entries(
                &format!("SELECT {ENTRY_COLUMNS} FROM entries WHERE group_name = ?1 ORDER BY rowid"),
                params![group],
            ),
            Selection::Entries(ids) => {
                let mut records = Vec::with_capacity(ids.len());
                for id in ids {
                    match self.load_record(id)? {
                        Some(record) => records.push(record),
                        None => log::warn!("⚠️ 条目不存在，已忽略: {}", id),
                    }
                }
                Ok(records)
            }
        }
    }

    pub fn load_record(&self, id: &RecordId) -> Result<Option<Record>, AppError> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {ENTRY_COLUMNS} FROM entries WHERE id = ?1"),
                params![id.0],
                EntryRow::from_row,
            )
            .optional()
            .map_err(|e| AppError::Database(format!("查询条目 {} 失败: {}", id, e)))?;
        row.map(EntryRow::into_record).transpose()
    }

    fn query_entries(
        &self,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<Record>, AppError> {
        let mut stmt = self
            .conn
            .prepare(sql)
            .map_err(|e| AppError::Database(format!("准备条目查询失败: {}", e)))?;
        let rows = stmt
            .query_map(params, EntryRow::from_row)
            .map_err(|e| AppError::Database(format!("查询条目失败: {}", e)))?;

        let mut records = Vec::new();
        for row in rows {
            let row = row.map_err(|e| AppError::Database(format!("读取条目失败: {}", e)))?;
            records.push(row.into_record()?);
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<Record> {
        vec![
            Record::new("e1")
                .with_field(FIELD_TITLE, "Example")
                .with_field(FIELD_URL, "example.com")
                .with_field("UserName", "alice")
                .with_group("Work"),
            Record::new("e2").with_field(FIELD_URL, "https://rust-lang.org").with_group("Home"),
            Record::new("e3").with_field(FIELD_TITLE, "no url").with_group("Work"),
        ]
    }

    #[test]
    fn import_then_load_all_preserves_order_and_fields() {
        let mut db = Database::open_in_memory().expect("open db");
        assert_eq!(db.import_records(&sample()).expect("import"), 3);

        let records = db.load_records(&Selection::All).expect("load");
        let ids: Vec<&str> = records.iter().map(|r| r.id.0.as_str()).collect();
        assert_eq!(ids, vec!["e1", "e2", "e3"]);
        assert_eq!(records[0].field("UserName"), "alice");
        assert_eq!(records[0].title(), "Example");
        assert_eq!(records[2].url(), "");
    }

    #[test]
    fn load_by_group_and_by_entries() {
        let mut db = Database::open_in_memory().expect("open db");
        db.import_records(&sample()).expect("import");

        let work = db.load_records(&Selection::Group("Work".into())).expect("load group");
        assert_eq!(work.len(), 2);
        assert!(work.iter().all(|r| r.group.as_deref() == Some("Work")));

        let picked = db
            .load_records(&Selection::Entries(vec![
                RecordId("e3".into()),
                RecordId("missing".into()),
                RecordId("e1".into()),
            ]))
            .expect("load entries");
        let ids: Vec<&str> = picked.iter().map(|r| r.id.0.as_str()).collect();
        assert_eq!(ids, vec!["e3", "e1"]);
    }

    #[test]
    fn reimport_updates_fields() {
        let mut db = Database::open_in_memory().expect("open db");
        db.import_records(&sample()).expect("import");
        db.import_records(&[Record::new("e1").with_field(FIELD_URL, "example.org")])
            .expect("reimport");

        let record = db.load_record(&RecordId("e1".into())).expect("load").expect("exists");
        assert_eq!(record.url(), "example.org");
        assert!(record.group.is_none());
        assert_eq!(record.field("UserName"), "");
    }
}
