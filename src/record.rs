//! 记录模型
//!
//! 批处理的输入单元：不透明标识 + 一组命名字符串字段（至少 `URL` 与 `Title`）。
//! 核心流程只读取记录，从不修改；图标关联通过 `IconStore::assign_icon` 写回。

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::favicon::IconId;

pub const FIELD_URL: &str = "URL";
pub const FIELD_TITLE: &str = "Title";

/// 记录标识。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub String);

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// 外部记录。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    /// 所属分组（可选），用于按组批量下载。
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub fields: HashMap<String, String>,
    /// 当前关联的图标。
    #[serde(default)]
    pub icon: Option<IconId>,
}

impl Record {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: RecordId(id.into()),
            group: None,
            fields: HashMap::new(),
            icon: None,
        }
    }

    /// 链式设置字段，主要用于测试与导入。
    pub fn with_field(mut self, name: &str, value: impl Into<String>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// 安全读取字段，缺失时返回空串。
    pub fn field(&self, name: &str) -> &str {
        self.fields.get(name).map(String::as_str).unwrap_or("")
    }

    pub fn url(&self) -> &str {
        self.field(FIELD_URL)
    }

    pub fn title(&self) -> &str {
        self.field(FIELD_TITLE)
    }
}
