use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use clap::{Parser, Subcommand};

use favicon_downloader::db::{Database, Selection};
use favicon_downloader::error::AppError;
use favicon_downloader::favicon::{
    BatchOrchestrator, ConsoleProgress, HttpIconFetcher, build_http_client,
};
use favicon_downloader::record::{Record, RecordId};
use favicon_downloader::settings::{default_settings_path, load_settings_from_path};

#[derive(Debug, Parser)]
#[command(name = "favicon-downloader", version, about = "批量下载条目网站图标并存为 PNG")]
struct Cli {
    /// SQLite 数据库路径
    #[arg(long, default_value = "favicons.db")]
    db: PathBuf,

    /// 设置文件路径（默认为数据库同目录下的 favicon.json）
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// 从 JSON 数组导入条目
    Import { file: PathBuf },

    /// 下载全部条目、某个分组或指定条目的图标
    Download {
        #[arg(long, conflicts_with = "entry")]
        group: Option<String>,

        #[arg(long)]
        entry: Vec<String>,
    },

    /// 列出已存储的图标
    Icons {
        /// 输出 data URL 便于预览
        #[arg(long)]
        data_url: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            log::error!("{}", err);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode, AppError> {
    let mut db = Database::open(&cli.db)?;

    match cli.command {
        Command::Import { file } => {
            let content = std::fs::read_to_string(&file)?;
            let records: Vec<Record> = serde_json::from_str(&content)
                .map_err(|e| AppError::Config(format!("解析导入文件失败: {}", e)))?;
            let count = db.import_records(&records)?;
            println!("imported {} entries", count);
            Ok(ExitCode::SUCCESS)
        }
        Command::Download { group, entry } => {
            let selection = match (group, entry) {
                (Some(group), _) => Selection::Group(group),
                (None, ids) if !ids.is_empty() => {
                    Selection::Entries(ids.into_iter().map(RecordId).collect())
                }
                _ => Selection::All,
            };
            download(&mut db, &cli.db, cli.config, selection).await
        }
        Command::Icons { data_url } => {
            for (summary, asset) in db.list_icons()? {
                if data_url {
                    println!(
                        "{}\t{}\t{}",
                        summary.id,
                        summary.referenced_by,
                        asset.to_data_url()
                    );
                } else {
                    println!(
                        "{}\t{} bytes\t{} entries",
                        summary.id, summary.png_len, summary.referenced_by
                    );
                }
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn download(
    db: &mut Database,
    db_path: &std::path::Path,
    config_path: Option<PathBuf>,
    selection: Selection,
) -> Result<ExitCode, AppError> {
    let settings_path = config_path.unwrap_or_else(|| default_settings_path(db_path));
    let settings = load_settings_from_path(&settings_path);

    let client = build_http_client(&settings.favicon)?;
    let locator = settings.build_locator(client.clone());
    let fetcher = Arc::new(HttpIconFetcher::new(client, &settings.favicon));
    let orchestrator = BatchOrchestrator::new(&settings.favicon, locator, fetcher);

    let records = db.load_records(&selection)?;
    if records.is_empty() {
        println!("no entries selected");
        return Ok(ExitCode::SUCCESS);
    }

    let progress = Arc::new(ConsoleProgress::new());
    let cancel = progress.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("收到 Ctrl-C，正在取消…");
            cancel.store(true, Ordering::SeqCst);
        }
    });

    let report = orchestrator.download_all(records, db, progress).await;

    println!(
        "succeeded={} new_icons={} reused_icons={} skipped={} failed={}{}",
        report.succeeded,
        report.icons_created,
        report.icons_reused,
        report.skipped,
        report.errors.len(),
        if report.cancelled { " (cancelled)" } else { "" }
    );
    match report.summary() {
        Some(summary) => {
            eprintln!("{}", summary);
            Ok(ExitCode::FAILURE)
        }
        None => Ok(ExitCode::SUCCESS),
    }
}
