/// 全局共享的 HTTP 客户端
///
/// 复用连接池，避免每次 API 调用都创建新客户端
use once_cell::sync::Lazy;
use reqwest::Client;
use std::time::Duration;

/// 全局 HTTP 客户端实例（使用懒初始化）
pub static HTTP_CLIENT: Lazy<Client> = Lazy::new(|| {
    Client::builder()
        // 超时配置
        .timeout(Duration::from_secs(60)) // 整体请求超时（大附件上传需要更长时间）
        .connect_timeout(Duration::from_secs(10))
        .user_agent(concat!("gmail-send/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!("构建 HTTP 客户端失败，使用默认配置: {}", e);
            Client::new()
        })
});

/// 获取全局 HTTP 客户端
pub fn get_client() -> &'static Client {
    &HTTP_CLIENT
}
