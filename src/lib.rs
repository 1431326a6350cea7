//! # 站点图标批量下载工具：库入口
//!
//! ## 架构总览
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                 命令行 (clap, src/main.rs)                │
//! │   import ── download [--group | --entry] ── icons        │
//! └───────┬──────────────────────────────────────────────────┘
//!         ↓
//! ┌───────┼──────────────────────────────────────────────────┐
//! │       ↓            库 (favicon_downloader)               │
//! │                                                          │
//! │  ┌─ error ────── AppError (外围层统一错误类型)           │
//! │  ├─ settings ─── favicon.json (serde_json)               │
//! │  ├─ record ───── Record / RecordId                       │
//! │  ├─ db ───────── SQLite (rusqlite) 条目 + 图标仓库       │
//! │  │                                                       │
//! │  └─ favicon ──── 下载流水线                              │
//! │      ├─ uri          记录 → 页面地址                     │
//! │      ├─ locator      页面地址 → 图标地址                 │
//! │      ├─ fetcher      HTTP 获取 (reqwest)                 │
//! │      ├─ transcoder   解码·缩放·PNG (image + fir)         │
//! │      ├─ unit         单条记录状态机 (tokio 任务)         │
//! │      ├─ batch        并发启动·按序收集·取消·错误汇总     │
//! │      ├─ repository   IconStore + 逐字节去重合并          │
//! │      └─ progress     CancelSignal / ProgressSink         │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## 模块职责
//!
//! | 模块 | 职责 |
//! |------|------|
//! | [`error`] | 统一错误类型 `AppError`，数据库/配置/仓库/HTTP 客户端 |
//! | [`record`] | 批处理输入的记录模型 |
//! | [`settings`] | 设置文件的加载（失败回退默认值）与保存 |
//! | [`db`] | SQLite 条目导入、按范围加载、图标仓库实现 |
//! | [`favicon`] | 图标定位、下载、转码、批处理编排 |

pub mod error;
pub mod db;
pub mod favicon;
pub mod record;
pub mod settings;
