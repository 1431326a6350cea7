//! # 批处理编排模块
//!
//! ## 设计思路
//!
//! 给定有序记录序列，为每条记录产出“图标关联”或“错误条目”，单条失败不影响其他记录。
//!
//! 1. 每条记录创建一个 `DownloadUnit`，保持输入顺序
//! 2. 全部单元并发启动（每条记录一个独立任务，不设并发上限），共享一个取消信号
//! 3. 严格按提交顺序（而不是完成顺序）收集；每次收集前询问界面是否取消，
//!    若取消则置位共享信号并停止收集，未收集的单元继续运行到下一个检查点
//! 4. 失败 → 记入错误报告；成功 → 合并进图标仓库；跳过/取消 → 静默忽略
//! 5. 结束（正常或取消）时通知界面关闭并刷新图标显示
//!
//! 按序收集以延迟换取确定性：较快的单元需要等待前一个单元被收集后才会被处理。

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Instant;
use tokio::task::JoinHandle;

use super::progress::{CancelSignal, ProgressSink};
use super::repository::{IconStore, MergeOutcome, merge_icon};
use super::unit::{DownloadUnit, ProgressUpdate, UnitContext, UnitState};
use super::{FaviconConfig, FaviconLocator, IconFetcher, IconTranscoder, UriResolver};
use crate::record::Record;

/// 错误报告条目：来源地址 + 错误信息。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchError {
    pub url: String,
    pub message: String,
}

/// 批处理结果汇总。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub errors: Vec<BatchError>,
    pub succeeded: usize,
    pub skipped: usize,
    /// 已收集但处于取消态的单元数。
    pub cancelled_units: usize,
    /// 因取消而未收集的单元数。
    pub outstanding: usize,
    pub icons_created: usize,
    pub icons_reused: usize,
    pub cancelled: bool,
}

impl BatchReport {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// 面向用户的错误摘要：单个错误直接展示，多个错误展示数量与最后一条。
    pub fn summary(&self) -> Option<String> {
        let last = self.errors.last()?;
        let last_message = format!("{}\n{}", last.url, last.message);
        if self.errors.len() == 1 {
            return Some(last_message);
        }
        Some(format!(
            "{} errors occurred. The last error message is shown here. \
             To see the other messages, select a smaller group of entries and start the download again.\n{}",
            self.errors.len(),
            last_message
        ))
    }
}

/// 一次批处理调用的状态：有序单元句柄、共享取消信号、累计错误。
struct BatchJob {
    units: Vec<(Arc<Record>, JoinHandle<DownloadUnit>)>,
    cancel: CancelSignal,
    errors: Vec<BatchError>,
}

impl BatchJob {
    /// 为每条记录创建并启动一个单元。
    fn launch(
        records: Vec<Record>,
        context: &Arc<UnitContext>,
        tracker: &Arc<BatchProgress>,
    ) -> Self {
        let cancel = CancelSignal::new();
        let units = records
            .into_iter()
            .enumerate()
            .map(|(index, record)| {
                let record = Arc::new(record);
                let mut unit = DownloadUnit::new(index, Arc::clone(&record));
                let tracker = Arc::clone(tracker);
                unit.subscribe(Arc::new(move |update: &ProgressUpdate| tracker.update(update)));

                let handle = tokio::spawn(unit.run(Arc::clone(context), cancel.clone()));
                (record, handle)
            })
            .collect();

        Self {
            units,
            cancel,
            errors: Vec::new(),
        }
    }

    fn record_error(&mut self, record: &Record, message: String) {
        self.errors.push(BatchError {
            url: record.url().to_string(),
            message,
        });
    }
}

/// 汇总单元进度，转发给界面。
struct BatchProgress {
    slots: Vec<AtomicU8>,
    sink: Arc<dyn ProgressSink>,
}

impl BatchProgress {
    fn new(total: usize, sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            slots: (0..total).map(|_| AtomicU8::new(0)).collect(),
            sink,
        }
    }

    fn update(&self, update: &ProgressUpdate) {
        if let Some(slot) = self.slots.get(update.index) {
            slot.fetch_max(update.progress, Ordering::SeqCst);
        }
        self.sink.unit_progress(update.index, &update.record, update.progress);
        self.sink.overall_progress(self.overall());
    }

    fn overall(&self) -> u8 {
        if self.slots.is_empty() {
            return 100;
        }
        let sum: usize = self
            .slots
            .iter()
            .map(|slot| usize::from(slot.load(Ordering::SeqCst)))
            .sum();
        (sum / self.slots.len()) as u8
    }
}

/// 批处理编排器。
pub struct BatchOrchestrator {
    context: Arc<UnitContext>,
}

impl BatchOrchestrator {
    pub fn new(
        config: &FaviconConfig,
        locator: Arc<dyn FaviconLocator>,
        fetcher: Arc<dyn IconFetcher>,
    ) -> Self {
        Self {
            context: Arc::new(UnitContext {
                resolver: UriResolver::new(),
                locator,
                fetcher,
                transcoder: Arc::new(IconTranscoder::new(config)),
            }),
        }
    }

    /// 下载全部记录的图标并合并进仓库。
    ///
    /// 仓库只在本方法的收集循环中被修改。
    ///
    /// # 示例
    /// ```rust,no_run
    /// use std::sync::Arc;
    /// use favicon_downloader::favicon::{
    ///     BatchOrchestrator, ConsoleProgress, FaviconConfig, HttpIconFetcher, MemoryIconStore,
    ///     RootFaviconLocator,
    /// };
    /// use favicon_downloader::record::{FIELD_URL, Record};
    ///
    /// # async fn demo() -> Result<(), favicon_downloader::error::AppError> {
    /// let config = FaviconConfig::default();
    /// let orchestrator = BatchOrchestrator::new(
    ///     &config,
    ///     Arc::new(RootFaviconLocator),
    ///     Arc::new(HttpIconFetcher::from_config(&config)?),
    /// );
    /// let mut store = MemoryIconStore::new();
    /// let records = vec![Record::new("1").with_field(FIELD_URL, "example.com")];
    /// let report = orchestrator
    ///     .download_all(records, &mut store, Arc::new(ConsoleProgress::new()))
    ///     .await;
    /// assert!(report.summary().is_none() || report.has_errors());
    /// # Ok(())
    /// # }
    /// ```
    pub async fn download_all<S>(
        &self,
        records: Vec<Record>,
        store: &mut S,
        ui: Arc<dyn ProgressSink>,
    ) -> BatchReport
    where
        S: IconStore + ?Sized,
    {
        let started = Instant::now();
        let total = records.len();
        ui.begin(total);

        let tracker = Arc::new(BatchProgress::new(total, Arc::clone(&ui)));
        ui.overall_progress(tracker.overall());

        let mut job = BatchJob::launch(records, &self.context, &tracker);
        let mut report = BatchReport::default();

        let units = std::mem::take(&mut job.units);
        let mut remaining = units.len();
        for (record, handle) in units {
            if ui.user_cancelled() {
                job.cancel.cancel();
                report.cancelled = true;
                report.outstanding = remaining;
                log::info!("⏹️ 用户取消，{} 个单元未收集", remaining);
                break;
            }
            remaining -= 1;

            let mut unit = match handle.await {
                Ok(unit) => unit,
                Err(e) => {
                    job.record_error(&record, format!("download task aborted: {}", e));
                    continue;
                }
            };

            match unit.state() {
                UnitState::Failed => {
                    let message = unit.error_message().unwrap_or_default();
                    job.record_error(&record, message);
                }
                UnitState::Succeeded => {
                    let Some(png) = unit.take_result_image() else {
                        job.record_error(&record, "succeeded without image data".to_string());
                        continue;
                    };
                    match Self::store_icon(store, &record, png) {
                        Ok(MergeOutcome::Created(_)) => {
                            report.succeeded += 1;
                            report.icons_created += 1;
                        }
                        Ok(MergeOutcome::Reused(_)) => {
                            report.succeeded += 1;
                            report.icons_reused += 1;
                        }
                        Err(e) => job.record_error(&record, format!("store failed: {}", e)),
                    }
                }
                UnitState::Skipped => report.skipped += 1,
                UnitState::Cancelled => report.cancelled_units += 1,
                state => log::warn!("单元 #{} 以非终态 {:?} 结束", unit.index(), state),
            }
        }

        report.errors = std::mem::take(&mut job.errors);

        ui.finish();
        ui.refresh_icons();

        log::info!(
            "📊 批处理结束 - 成功={} 新图标={} 复用={} 跳过={} 失败={} 取消={} 耗时={}ms",
            report.succeeded,
            report.icons_created,
            report.icons_reused,
            report.skipped,
            report.errors.len(),
            report.cancelled,
            started.elapsed().as_millis()
        );

        report
    }

    fn store_icon<S: IconStore + ?Sized>(
        store: &mut S,
        record: &Record,
        png: Vec<u8>,
    ) -> Result<MergeOutcome, crate::error::AppError> {
        let outcome = merge_icon(store, png)?;
        store.assign_icon(&record.id, outcome.id())?;
        Ok(outcome)
    }
}
