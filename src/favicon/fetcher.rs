//! # 网络获取模块
//!
//! ## 设计思路
//!
//! 每个地址只发一次 GET，不重试；请求头固定（桌面浏览器 UA、`Accept-Language: *`、
//! 带权重的 `Accept`）。重定向沿用 HTTP 客户端默认策略，本层不强加超时，
//! 取消是批处理层的协作式检查点，而不是抢占。
//!
//! ## 实现思路
//!
//! - 复用单个 `reqwest::Client`，请求头在构建时写入默认头。
//! - 分块读取响应体，超过体积上限立即失败。
//! - 所有传输错误统一映射为 `DownloadError::FetchFailed`。

use async_trait::async_trait;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, CONTENT_LENGTH, HeaderMap, HeaderValue, USER_AGENT};
use std::time::Duration;
use url::Url;

use super::{DownloadError, FaviconConfig};
use crate::error::AppError;

const BUFFER_INITIAL_CAPACITY: usize = 16 * 1024;

/// 单次图标获取：一个地址一次 GET。
#[async_trait]
pub trait IconFetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>, DownloadError>;
}

/// 构建带固定请求头的 HTTP 客户端，获取器与定位器共用。
pub fn build_http_client(config: &FaviconConfig) -> Result<reqwest::Client, AppError> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, header_value(&config.user_agent)?);
    headers.insert(ACCEPT_LANGUAGE, header_value(&config.accept_language)?);
    headers.insert(ACCEPT, header_value(&config.accept)?);

    let mut builder = reqwest::Client::builder().default_headers(headers);
    if let Some(secs) = config.request_timeout_secs {
        builder = builder.timeout(Duration::from_secs(secs));
    }

    builder
        .build()
        .map_err(|e| AppError::Http(format!("创建 HTTP 客户端失败：{}", e)))
}

fn header_value(value: &str) -> Result<HeaderValue, AppError> {
    HeaderValue::from_str(value)
        .map_err(|e| AppError::Config(format!("请求头取值无效 '{}'：{}", value, e)))
}

/// 基于 `reqwest` 的获取器。
#[derive(Clone)]
pub struct HttpIconFetcher {
    client: reqwest::Client,
    max_bytes: u64,
}

impl HttpIconFetcher {
    pub fn new(client: reqwest::Client, config: &FaviconConfig) -> Self {
        Self {
            client,
            max_bytes: config.max_icon_bytes,
        }
    }

    pub fn from_config(config: &FaviconConfig) -> Result<Self, AppError> {
        Ok(Self::new(build_http_client(config)?, config))
    }
}

#[async_trait]
impl IconFetcher for HttpIconFetcher {
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>, DownloadError> {
        log::debug!("📡 获取图标：{}", redact_url_for_log(url));
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| DownloadError::FetchFailed(map_reqwest_error(&e, url)))?;

        let (bytes, _) = read_body_limited(response, self.max_bytes)
            .await
            .map_err(DownloadError::FetchFailed)?;

        log::debug!(
            "✅ 图标获取完成 - {} bytes（{}）",
            bytes.len(),
            infer::get(&bytes).map(|k| k.mime_type()).unwrap_or("unknown")
        );
        Ok(bytes)
    }
}

/// 校验状态码并分块读取响应体，返回字节与最终地址（跟随重定向后）。
///
/// 错误以可读字符串返回，由调用方包装成对应阶段的错误。
pub(crate) async fn read_body_limited(
    response: reqwest::Response,
    max_bytes: u64,
) -> Result<(Vec<u8>, Url), String> {
    let final_url = response.url().clone();
    let status = response.status();
    if !status.is_success() {
        return Err(format!("HTTP {}: {}", status.as_u16(), status_message(status.as_u16())));
    }

    let declared = response
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|cl| cl.to_str().ok())
        .and_then(|cl| cl.parse::<u64>().ok());

    if let Some(size) = declared {
        if size > max_bytes {
            return Err(format!("响应过大：{} 字节（限制：{} 字节）", size, max_bytes));
        }
    }

    let initial_capacity = declared
        .map(|len| len.min(max_bytes) as usize)
        .filter(|len| *len > 0)
        .unwrap_or(BUFFER_INITIAL_CAPACITY);
    let mut buffer = Vec::with_capacity(initial_capacity);
    let mut response = response;

    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| format!("读取响应失败：{}", e))?
    {
        if (buffer.len() + chunk.len()) as u64 > max_bytes {
            return Err(format!("响应超过体积限制（{} 字节）", max_bytes));
        }
        buffer.extend_from_slice(&chunk);
    }

    Ok((buffer, final_url))
}

fn map_reqwest_error(e: &reqwest::Error, url: &Url) -> String {
    let redacted = redact_url_for_log(url);
    let msg = e.to_string().replace(url.as_str(), &redacted);
    if e.is_timeout() {
        format!("请求超时：{}", msg)
    } else if e.is_connect() {
        format!("无法连接：{}", msg)
    } else {
        format!("请求失败：{}", msg)
    }
}

fn status_message(code: u16) -> &'static str {
    match code {
        404 => "Not Found",
        403 => "Forbidden",
        500..=599 => "Server Error",
        _ => "Request Failed",
    }
}

/// 日志中去掉查询串与片段，避免泄露令牌。
pub(crate) fn redact_url_for_log(url: &Url) -> String {
    let mut clean = url.clone();
    clean.set_query(None);
    clean.set_fragment(None);
    clean.to_string()
}

#[cfg(test)]
pub(crate) mod test_server {
    //! 单连接测试服务器：接受一次请求，回写预设响应，并把请求头交回测试线程。
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread::{self, JoinHandle};

    pub(crate) fn serve_once(
        status_line: &'static str,
        content_type: &'static str,
        body: Vec<u8>,
    ) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind test server failed");
        let addr = listener.local_addr().expect("read local addr failed");

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("accept failed");

            let mut req_buf = [0u8; 4096];
            let n = stream.read(&mut req_buf).unwrap_or(0);
            let request = String::from_utf8_lossy(&req_buf[..n]).to_string();

            let head = format!(
                "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                status_line,
                content_type,
                body.len()
            );
            stream.write_all(head.as_bytes()).expect("write headers failed");
            stream.write_all(&body).expect("write body failed");
            stream.flush().expect("flush failed");
            request
        });

        (format!("http://127.0.0.1:{}", addr.port()), server)
    }
}
