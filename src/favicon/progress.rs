//! # 进度与取消模块
//!
//! ## 设计思路
//!
//! - `CancelSignal`：整个批次共享的只读取消标志，创建单元时传入；单元只在阶段检查点轮询，
//!   从不强制中断进行中的网络或解码调用。
//! - `ProgressSink`：外部进度界面的注入接口，接收单元进度、暴露“用户请求取消”，
//!   并在批次前后收到开始/结束通知。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use crate::record::RecordId;

/// 批次共享的协作式取消信号。
#[derive(Debug, Clone, Default)]
pub struct CancelSignal(Arc<AtomicBool>);

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// 外部进度界面。
///
/// 除 `user_cancelled` 外都有空实现，调用方只需覆盖关心的回调。
/// 单元进度回调会在执行单元的线程上同步触发，实现方需保证线程安全。
pub trait ProgressSink: Send + Sync {
    /// 批次开始，`total` 为记录数。
    fn begin(&self, _total: usize) {}

    fn unit_progress(&self, _index: usize, _record: &RecordId, _progress: u8) {}

    /// 全部单元进度的平均值（0~100）。
    fn overall_progress(&self, _percent: u8) {}

    fn user_cancelled(&self) -> bool;

    /// 批次结束（正常完成或取消），界面应隐藏并关闭。
    fn finish(&self) {}

    /// 图标显示需要刷新。
    fn refresh_icons(&self) {}
}

/// 命令行进度：写日志，取消标志由 Ctrl-C 处理器置位。
#[derive(Debug, Default)]
pub struct ConsoleProgress {
    cancel_requested: Arc<AtomicBool>,
    last_logged: AtomicU8,
}

impl ConsoleProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// 供信号处理器置位的取消标志。
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel_requested)
    }
}

impl ProgressSink for ConsoleProgress {
    fn begin(&self, total: usize) {
        self.last_logged.store(0, Ordering::SeqCst);
        log::info!("🚀 开始下载图标：{} 条记录（Ctrl-C 取消）", total);
    }

    fn unit_progress(&self, index: usize, record: &RecordId, progress: u8) {
        log::debug!("  #{} [{}] {}%", index, record, progress);
    }

    fn overall_progress(&self, percent: u8) {
        // 每 10% 打一次，避免大批量时刷屏
        let bucket = percent / 10 * 10;
        if self.last_logged.fetch_max(bucket, Ordering::SeqCst) < bucket {
            log::info!("⏳ 总进度 {}%", bucket);
        }
    }

    fn user_cancelled(&self) -> bool {
        self.cancel_requested.load(Ordering::SeqCst)
    }

    fn finish(&self) {
        log::info!("🏁 图标下载结束");
    }

    fn refresh_icons(&self) {
        log::debug!("图标显示已标记为需要刷新");
    }
}
