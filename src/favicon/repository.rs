//! # 图标仓库合并模块
//!
//! ## 设计思路
//!
//! 仓库本身是外部协作者（`IconStore`），本模块只规定合并策略：
//! 新的 PNG 字节与现有图标逐字节比较，相同则复用其标识，否则创建新图标并追加。
//!
//! ## 实现思路
//!
//! 线性扫描：仓库中不同图标的数量有限，精确去重比扫描开销更重要。
//! 仓库只由批处理的收集循环修改，单元从不直接触碰，因此不需要加锁。

use base64::{Engine as _, engine::general_purpose};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::record::RecordId;

/// 图标唯一标识。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IconId(pub Uuid);

impl IconId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for IconId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for IconId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for IconId {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| AppError::Store(format!("图标标识无效 '{}'：{}", s, e)))
    }
}

/// 已存储的图标。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IconAsset {
    pub id: IconId,
    pub png: Vec<u8>,
}

impl IconAsset {
    /// `data:image/png;base64,...`，便于预览。
    pub fn to_data_url(&self) -> String {
        format!("data:image/png;base64,{}", general_purpose::STANDARD.encode(&self.png))
    }
}

/// 外部图标仓库。
pub trait IconStore {
    /// 枚举现有图标。
    fn icons(&self) -> Result<Vec<IconAsset>, AppError>;

    /// 追加新图标并返回其标识。
    fn add_icon(&mut self, png: Vec<u8>) -> Result<IconId, AppError>;

    /// 将记录关联到图标。
    fn assign_icon(&mut self, record: &RecordId, icon: IconId) -> Result<(), AppError>;
}

/// 合并结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Reused(IconId),
    Created(IconId),
}

impl MergeOutcome {
    pub fn id(self) -> IconId {
        match self {
            Self::Reused(id) | Self::Created(id) => id,
        }
    }
}

/// 合并 PNG 到仓库：逐字节相同则复用，否则新建。
pub fn merge_icon<S: IconStore + ?Sized>(
    store: &mut S,
    png: Vec<u8>,
) -> Result<MergeOutcome, AppError> {
    if let Some(existing) = store.icons()?.into_iter().find(|asset| asset.png == png) {
        return Ok(MergeOutcome::Reused(existing.id));
    }
    store.add_icon(png).map(MergeOutcome::Created)
}

/// 内存仓库，供测试与嵌入方使用。
#[derive(Debug, Default)]
pub struct MemoryIconStore {
    icons: Vec<IconAsset>,
    assignments: Vec<(RecordId, IconId)>,
}

impl MemoryIconStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.icons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.icons.is_empty()
    }

    /// 按关联发生顺序返回的 (记录, 图标) 列表。
    pub fn assignments(&self) -> &[(RecordId, IconId)] {
        &self.assignments
    }

    /// 记录当前关联的图标（以最后一次关联为准）。
    pub fn icon_of(&self, record: &RecordId) -> Option<IconId> {
        self.assignments
            .iter()
            .rev()
            .find(|(r, _)| r == record)
            .map(|(_, icon)| *icon)
    }

    pub fn get(&self, id: IconId) -> Option<&IconAsset> {
        self.icons.iter().find(|asset| asset.id == id)
    }
}

impl IconStore for MemoryIconStore {
    fn icons(&self) -> Result<Vec<IconAsset>, AppError> {
        Ok(self.icons.clone())
    }

    fn add_icon(&mut self, png: Vec<u8>) -> Result<IconId, AppError> {
        let id = IconId::new();
        self.icons.push(IconAsset { id, png });
        Ok(id)
    }

    fn assign_icon(&mut self, record: &RecordId, icon: IconId) -> Result<(), AppError> {
        self.assignments.push((record.clone(), icon));
        Ok(())
    }
}
