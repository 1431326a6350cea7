//! # 站点图标批量下载模块
//!
//! ## 流水线
//!
//! ```text
//! Record ──UriResolver──► 页面地址 ──FaviconLocator──► 图标地址
//!        ──IconFetcher──► 原始字节 ──IconTranscoder──► N×N PNG
//!        ──merge_icon──► IconStore（逐字节去重）
//! ```
//!
//! 每条记录一个 `DownloadUnit`，由 `BatchOrchestrator` 并发启动、按序收集。
//!
//! ## 子模块
//!
//! | 模块 | 职责 |
//! |------|------|
//! | `uri` | 从记录字段推导页面地址 |
//! | `locator` | 页面地址 → 图标地址（根路径 / 解析 HTML） |
//! | `fetcher` | HTTP 获取，带请求头与大小上限 |
//! | `transcoder` | ICO/PNG/JPEG/GIF/BMP 解码并缩放为 PNG |
//! | `unit` | 单条记录的状态机 |
//! | `batch` | 批处理编排、取消、错误汇总 |
//! | `repository` | 图标仓库接口与合并策略 |
//! | `progress` | 取消信号与进度界面接口 |
//! | `config` | 可调参数 |
//! | `error` | 阶段错误 |

mod batch;
mod config;
mod error;
mod fetcher;
mod locator;
mod progress;
mod repository;
mod transcoder;
mod unit;
mod uri;

pub use batch::{BatchError, BatchOrchestrator, BatchReport};
pub use config::{FaviconConfig, ResampleQuality};
pub use error::DownloadError;
pub use fetcher::{HttpIconFetcher, IconFetcher, build_http_client};
pub use locator::{FaviconLocator, HtmlFaviconLocator, RootFaviconLocator, root_favicon_url};
pub use progress::{CancelSignal, ConsoleProgress, ProgressSink};
pub use repository::{IconAsset, IconId, IconStore, MemoryIconStore, MergeOutcome, merge_icon};
pub use transcoder::IconTranscoder;
pub use unit::{
    DownloadUnit, PROGRESS_DONE, PROGRESS_FETCHED, PROGRESS_RESOLVED, PROGRESS_START,
    ProgressListener, ProgressUpdate, UnitContext, UnitState,
};
pub use uri::UriResolver;
