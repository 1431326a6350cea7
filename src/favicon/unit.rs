//! # 下载单元状态机
//!
//! ## 设计思路
//!
//! 每条记录对应一个 `DownloadUnit`，按固定顺序推进：
//!
//! ```text
//! Pending →(检查)→ ResolvingUri →(检查)→ Fetching →(检查)→ Transcoding →(检查)→ Succeeded
//!                       │                    │                  │
//!                       ├→ Skipped           └→ Failed          └→ Failed
//!                       └→ Failed
//! 任一检查点发现取消信号 → Cancelled
//! ```
//!
//! 恰好到达一个终态，状态不回退。进度依次为 0 / 33 / 66 / 100，单调不减，
//! 每次变化同步通知所有订阅者。
//!
//! ## 实现思路
//!
//! - 单元被移动进自己的任务，运行结束后整体交还给编排器；字段只由该任务写，
//!   编排器在收集后读取，不存在并发读写。
//! - 阶段失败在本地转换为 `Failed`，不会向外传播。
//! - 转码是 CPU 密集操作，放到 `spawn_blocking` 执行。

use std::sync::Arc;
use url::Url;

use super::fetcher::redact_url_for_log;
use super::progress::CancelSignal;
use super::{DownloadError, FaviconLocator, IconFetcher, IconTranscoder, UriResolver};
use crate::record::{Record, RecordId};

pub const PROGRESS_START: u8 = 0;
pub const PROGRESS_RESOLVED: u8 = 33;
pub const PROGRESS_FETCHED: u8 = 66;
pub const PROGRESS_DONE: u8 = 100;

/// 单元状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitState {
    Pending,
    ResolvingUri,
    Fetching,
    Transcoding,
    Succeeded,
    Failed,
    /// 记录没有可用地址，什么也不做。
    Skipped,
    Cancelled,
}

impl UnitState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Skipped | Self::Cancelled)
    }

    fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::ResolvingUri => 1,
            Self::Fetching => 2,
            Self::Transcoding => 3,
            Self::Succeeded | Self::Failed | Self::Skipped | Self::Cancelled => 4,
        }
    }
}

/// 进度通知内容。
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    pub index: usize,
    pub record: RecordId,
    pub progress: u8,
    pub state: UnitState,
}

/// 进度订阅回调，在单元所在线程上同步调用。
pub type ProgressListener = Arc<dyn Fn(&ProgressUpdate) + Send + Sync>;

/// 单元执行所需的共享协作者。
pub struct UnitContext {
    pub resolver: UriResolver,
    pub locator: Arc<dyn FaviconLocator>,
    pub fetcher: Arc<dyn IconFetcher>,
    pub transcoder: Arc<IconTranscoder>,
}

/// 单条记录的下载状态机。
pub struct DownloadUnit {
    index: usize,
    record: Arc<Record>,
    state: UnitState,
    progress: u8,
    error: Option<DownloadError>,
    skip_reason: Option<String>,
    icon_url: Option<Url>,
    result_image: Option<Vec<u8>>,
    listeners: Vec<ProgressListener>,
}

impl std::fmt::Debug for DownloadUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadUnit")
            .field("index", &self.index)
            .field("record", &self.record.id)
            .field("state", &self.state)
            .field("progress", &self.progress)
            .field("error", &self.error)
            .field("result_len", &self.result_image.as_ref().map(Vec::len))
            .finish()
    }
}

impl DownloadUnit {
    pub fn new(index: usize, record: Arc<Record>) -> Self {
        Self {
            index,
            record,
            state: UnitState::Pending,
            progress: PROGRESS_START,
            error: None,
            skip_reason: None,
            icon_url: None,
            result_image: None,
            listeners: Vec::new(),
        }
    }

    /// 订阅进度变化。
    pub fn subscribe(&mut self, listener: ProgressListener) {
        self.listeners.push(listener);
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn record(&self) -> &Arc<Record> {
        &self.record
    }

    pub fn state(&self) -> UnitState {
        self.state
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn error(&self) -> Option<&DownloadError> {
        self.error.as_ref()
    }

    /// 当且仅当存在错误信息时为 true。
    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(ToString::to_string)
    }

    pub fn skip_reason(&self) -> Option<&str> {
        self.skip_reason.as_deref()
    }

    /// 定位器给出的图标地址（到达过该阶段才有）。
    pub fn icon_url(&self) -> Option<&Url> {
        self.icon_url.as_ref()
    }

    pub fn result_image(&self) -> Option<&[u8]> {
        self.result_image.as_deref()
    }

    pub fn take_result_image(&mut self) -> Option<Vec<u8>> {
        self.result_image.take()
    }

    /// 执行整个状态机，结束后交还单元本身。
    pub async fn run(mut self, context: Arc<UnitContext>, cancel: CancelSignal) -> Self {
        self.execute(&context, &cancel).await;
        debug_assert!(self.state.is_terminal());
        self
    }

    async fn execute(&mut self, context: &UnitContext, cancel: &CancelSignal) {
        self.set_progress(PROGRESS_START);
        if self.cancelled_at_checkpoint(cancel) {
            return;
        }

        self.transition(UnitState::ResolvingUri);
        let page_url = match context.resolver.resolve(&self.record) {
            Ok(url) => url,
            Err(err) if !err.is_reportable() => {
                self.skip(err.to_string());
                return;
            }
            Err(err) => {
                self.fail(err);
                return;
            }
        };

        let icon_url = match context.locator.locate(&page_url).await {
            Ok(url) => url,
            Err(err) => {
                self.fail(err);
                return;
            }
        };
        self.icon_url = Some(icon_url.clone());

        self.set_progress(PROGRESS_RESOLVED);
        if self.cancelled_at_checkpoint(cancel) {
            return;
        }

        self.transition(UnitState::Fetching);
        let raw = match context.fetcher.fetch(&icon_url).await {
            Ok(raw) => raw,
            Err(err) => {
                self.fail(err);
                return;
            }
        };

        self.set_progress(PROGRESS_FETCHED);
        if self.cancelled_at_checkpoint(cancel) {
            return;
        }

        self.transition(UnitState::Transcoding);
        let transcoder = Arc::clone(&context.transcoder);
        let transcoded = tokio::task::spawn_blocking(move || transcoder.transcode(&raw))
            .await
            .unwrap_or_else(|e| {
                Err(DownloadError::TranscodeFailed(format!("转码任务异常退出：{}", e)))
            });

        self.set_progress(PROGRESS_DONE);
        match transcoded {
            Ok(png) => {
                if self.cancelled_at_checkpoint(cancel) {
                    return;
                }
                self.succeed(png);
            }
            Err(err) => self.fail(err),
        }
    }

    fn cancelled_at_checkpoint(&mut self, cancel: &CancelSignal) -> bool {
        if !cancel.is_cancelled() {
            return false;
        }
        log::debug!("⏹️ #{} [{}] 在 {:?} 之后取消", self.index, self.record.id, self.state);
        self.transition(UnitState::Cancelled);
        true
    }

    fn skip(&mut self, reason: String) {
        log::debug!("⏭️ #{} [{}] 跳过：{}", self.index, self.record.id, reason);
        self.skip_reason = Some(reason);
        self.transition(UnitState::Skipped);
        self.set_progress(PROGRESS_DONE);
    }

    fn fail(&mut self, err: DownloadError) {
        log::warn!(
            "❌ #{} [{}] {} 阶段失败：{}（{}）{}",
            self.index,
            self.record.id,
            err.stage(),
            err,
            err.code(),
            self.icon_url
                .as_ref()
                .map(|u| format!(" - {}", redact_url_for_log(u)))
                .unwrap_or_default()
        );
        self.error = Some(err);
        self.transition(UnitState::Failed);
    }

    fn succeed(&mut self, png: Vec<u8>) {
        log::debug!("✅ #{} [{}] 图标就绪（{} bytes）", self.index, self.record.id, png.len());
        self.result_image = Some(png);
        self.transition(UnitState::Succeeded);
    }

    /// 前进到下一个状态；终态之后不再变化。
    fn transition(&mut self, next: UnitState) {
        if self.state.is_terminal() {
            return;
        }
        debug_assert!(next.rank() > self.state.rank(), "{:?} -> {:?}", self.state, next);
        self.state = next;
    }

    fn set_progress(&mut self, progress: u8) {
        let first_report = self.progress == PROGRESS_START && progress == PROGRESS_START;
        if progress <= self.progress && !first_report {
            return;
        }
        self.progress = progress;

        let update = ProgressUpdate {
            index: self.index,
            record: self.record.id.clone(),
            progress,
            state: self.state,
        };
        for listener in &self.listeners {
            listener(&update);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::favicon::transcoder::test_images::ico_bytes;
    use crate::favicon::{FaviconConfig, RootFaviconLocator};
    use crate::record::{FIELD_TITLE, FIELD_URL};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// 返回固定字节；可选在获取时触发取消，模拟“获取过程中用户取消”。
    struct StaticFetcher {
        bytes: Result<Vec<u8>, DownloadError>,
        cancel_during_fetch: Option<CancelSignal>,
    }

    #[async_trait]
    impl IconFetcher for StaticFetcher {
        async fn fetch(&self, _url: &Url) -> Result<Vec<u8>, DownloadError> {
            if let Some(cancel) = &self.cancel_during_fetch {
                cancel.cancel();
            }
            self.bytes.clone()
        }
    }

    struct FailingLocator;

    #[async_trait]
    impl FaviconLocator for FailingLocator {
        async fn locate(&self, _page_url: &Url) -> Result<Url, DownloadError> {
            Err(DownloadError::LocatorFailed("no icon link".into()))
        }
    }

    fn context_with(
        fetcher: StaticFetcher,
        locator: Arc<dyn FaviconLocator>,
    ) -> Arc<UnitContext> {
        Arc::new(UnitContext {
            resolver: UriResolver::new(),
            locator,
            fetcher: Arc::new(fetcher),
            transcoder: Arc::new(IconTranscoder::new(&FaviconConfig::default())),
        })
    }

    fn ok_context(bytes: Vec<u8>) -> Arc<UnitContext> {
        context_with(
            StaticFetcher { bytes: Ok(bytes), cancel_during_fetch: None },
            Arc::new(RootFaviconLocator),
        )
    }

    fn unit_for(url: &str) -> DownloadUnit {
        DownloadUnit::new(0, Arc::new(Record::new("r").with_field(FIELD_URL, url)))
    }

    fn recorded(unit: &mut DownloadUnit) -> Arc<Mutex<Vec<u8>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        unit.subscribe(Arc::new(move |update: &ProgressUpdate| {
            sink.lock().expect("lock").push(update.progress);
        }));
        seen
    }

    #[tokio::test]
    async fn successful_run_reports_every_stage() {
        let mut unit = unit_for("example.com");
        let seen = recorded(&mut unit);

        let unit = unit.run(ok_context(ico_bytes(32, 32)), CancelSignal::new()).await;

        assert_eq!(unit.state(), UnitState::Succeeded);
        assert_eq!(unit.progress(), PROGRESS_DONE);
        assert!(!unit.has_error());
        assert!(unit.result_image().is_some());
        assert_eq!(
            unit.icon_url().map(Url::as_str),
            Some("http://example.com/favicon.ico")
        );
        assert_eq!(*seen.lock().expect("lock"), vec![0, 33, 66, 100]);
    }

    #[tokio::test]
    async fn record_without_url_is_skipped_not_failed() {
        let unit = DownloadUnit::new(0, Arc::new(Record::new("empty")));
        let unit = unit.run(ok_context(ico_bytes(16, 16)), CancelSignal::new()).await;

        assert_eq!(unit.state(), UnitState::Skipped);
        assert!(!unit.has_error());
        assert!(unit.result_image().is_none());
        assert!(unit.skip_reason().is_some_and(|r| r.starts_with("no usable url:")));
    }

    #[tokio::test]
    async fn unparsable_address_fails_instead_of_skipping() {
        let record = Record::new("bank").with_field(FIELD_TITLE, "Bank of America v2.0");
        let unit = DownloadUnit::new(0, Arc::new(record))
            .run(ok_context(ico_bytes(16, 16)), CancelSignal::new())
            .await;

        assert_eq!(unit.state(), UnitState::Failed);
        assert_eq!(unit.progress(), PROGRESS_START);
        assert!(matches!(unit.error(), Some(DownloadError::LocatorFailed(_))));
        assert!(unit.skip_reason().is_none());
    }

    #[tokio::test]
    async fn locator_failure_is_captured() {
        let context = context_with(
            StaticFetcher { bytes: Ok(ico_bytes(16, 16)), cancel_during_fetch: None },
            Arc::new(FailingLocator),
        );
        let unit = unit_for("example.com").run(context, CancelSignal::new()).await;

        assert_eq!(unit.state(), UnitState::Failed);
        assert_eq!(unit.progress(), PROGRESS_START);
        assert_eq!(unit.error_message().as_deref(), Some("locator failed: no icon link"));
    }

    #[tokio::test]
    async fn fetch_failure_is_captured() {
        let context = context_with(
            StaticFetcher {
                bytes: Err(DownloadError::FetchFailed("HTTP 404: Not Found".into())),
                cancel_during_fetch: None,
            },
            Arc::new(RootFaviconLocator),
        );
        let unit = unit_for("example.com").run(context, CancelSignal::new()).await;

        assert_eq!(unit.state(), UnitState::Failed);
        assert_eq!(unit.progress(), PROGRESS_RESOLVED);
        assert!(unit.has_error());
        assert!(unit.result_image().is_none());
    }

    #[tokio::test]
    async fn undecodable_payload_fails_with_transcode_error() {
        let unit = unit_for("example.com")
            .run(ok_context(b"<html>nope</html>".to_vec()), CancelSignal::new())
            .await;

        assert_eq!(unit.state(), UnitState::Failed);
        assert!(matches!(unit.error(), Some(DownloadError::TranscodeFailed(_))));
        assert!(unit.result_image().is_none());
    }

    #[tokio::test]
    async fn cancelled_before_start_never_resolves() {
        let cancel = CancelSignal::new();
        cancel.cancel();

        let unit = unit_for("example.com").run(ok_context(ico_bytes(16, 16)), cancel).await;

        assert_eq!(unit.state(), UnitState::Cancelled);
        assert_eq!(unit.progress(), PROGRESS_START);
        assert!(unit.icon_url().is_none());
        assert!(!unit.has_error());
    }

    #[tokio::test]
    async fn cancel_during_fetch_completes_fetch_then_stops() {
        let cancel = CancelSignal::new();
        let context = context_with(
            StaticFetcher {
                bytes: Ok(ico_bytes(16, 16)),
                cancel_during_fetch: Some(cancel.clone()),
            },
            Arc::new(RootFaviconLocator),
        );

        let unit = unit_for("example.com").run(context, cancel).await;

        assert_eq!(unit.state(), UnitState::Cancelled);
        assert_eq!(unit.progress(), PROGRESS_FETCHED);
        assert!(unit.result_image().is_none());
        assert!(!unit.has_error());
    }
}
