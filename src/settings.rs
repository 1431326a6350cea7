//! 设置文件
//!
//! 默认位于数据库同目录下的 `favicon.json`：
//!
//! ```json
//! { "favicon": { "icon_size": 16, "resample_quality": "bicubic" }, "locator": "html" }
//! ```
//!
//! 文件缺失或解析失败时使用默认值并给出警告，不阻断下载。

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::favicon::{FaviconConfig, FaviconLocator, HtmlFaviconLocator, RootFaviconLocator};

pub const SETTINGS_FILE_NAME: &str = "favicon.json";

/// 图标地址的定位方式。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocatorKind {
    /// 解析页面中的 `<link rel="icon">`，找不到时回退到根路径。
    #[default]
    Html,
    /// 直接使用 `/favicon.ico`。
    Root,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub favicon: FaviconConfig,
    pub locator: LocatorKind,
}

impl AppSettings {
    /// 按设置构造定位器；HTML 定位器与获取器共用同一个客户端。
    pub fn build_locator(&self, client: reqwest::Client) -> Arc<dyn FaviconLocator> {
        match self.locator {
            LocatorKind::Html => Arc::new(HtmlFaviconLocator::new(client, &self.favicon)),
            LocatorKind::Root => Arc::new(RootFaviconLocator),
        }
    }
}

/// 数据库同目录下的默认设置文件路径。
pub fn default_settings_path(db_path: &Path) -> PathBuf {
    db_path.with_file_name(SETTINGS_FILE_NAME)
}

pub fn load_settings_from_path(settings_path: &Path) -> AppSettings {
    if !settings_path.exists() {
        log::debug!("设置文件不存在，使用默认值: {}", settings_path.display());
        return AppSettings::default();
    }

    let parsed = fs::read_to_string(settings_path)
        .map_err(AppError::from)
        .and_then(|content| {
            serde_json::from_str::<AppSettings>(&content)
                .map_err(|e| AppError::Config(format!("解析设置文件失败: {}", e)))
        })
        .and_then(|settings| settings.favicon.validate().map(|_| settings));

    match parsed {
        Ok(settings) => settings,
        Err(e) => {
            log::warn!("⚠️ {}，使用默认设置（{}）", e, settings_path.display());
            AppSettings::default()
        }
    }
}

pub fn save_settings_to_path(settings_path: &Path, settings: &AppSettings) -> Result<(), AppError> {
    settings.favicon.validate()?;
    if let Some(parent) = settings_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let content = serde_json::to_string_pretty(settings)
        .map_err(|e| AppError::Config(format!("序列化设置失败: {}", e)))?;
    fs::write(settings_path, content)?;
    Ok(())
}
