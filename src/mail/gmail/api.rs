/// Gmail API 调用模块
///
/// 负责调用 `users.messages.send` 提交编码后的邮件
use anyhow::{Context, Result};
use url::Url;

use crate::mail::gmail::types::SendResult;
use crate::mail::mime::EncodedMessage;
use crate::utils::http_client;

/// Gmail API 根地址
const GMAIL_API_BASE: &str = "https://gmail.googleapis.com";

/// Gmail API 客户端
pub struct GmailApiClient {
    access_token: String,
    base_url: String,
}

impl GmailApiClient {
    /// 创建新的 Gmail API 客户端
    ///
    /// # Arguments
    /// * `access_token` - 有效的 Access Token
    pub fn new(access_token: String) -> Self {
        Self {
            access_token,
            base_url: GMAIL_API_BASE.to_string(),
        }
    }

    /// 替换 API 根地址
    #[cfg(test)]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// 发送邮件
    ///
    /// # Arguments
    /// * `user_id` - 用户标识，`me` 表示当前授权账户
    /// * `message` - `{"raw": ...}` 信封
    pub async fn send_message(&self, user_id: &str, message: &EncodedMessage) -> Result<SendResult> {
        let url = self.send_url(user_id)?;
        tracing::debug!("POST {}", url);

        let response = http_client::get_client()
            .post(url)
            .bearer_auth(&self.access_token)
            .json(message)
            .send()
            .await
            .context("请求 Gmail 发送接口失败")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();

            if status == 401 {
                anyhow::bail!("Token 已过期或被撤销 (401): {}", error_text);
            }

            anyhow::bail!("Gmail API 返回错误 {}: {}", status, error_text);
        }

        let result: SendResult = response.json().await.context("解析发送结果失败")?;
        Ok(result)
    }

    /// `users/{userId}/messages/send` 地址，`user_id` 按路径段编码
    fn send_url(&self, user_id: &str) -> Result<Url> {
        let mut url = Url::parse(&self.base_url).context("Gmail API 根地址无效")?;
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("Gmail API 根地址不是层级 URL: {}", self.base_url))?
            .pop_if_empty()
            .extend(["gmail", "v1", "users", user_id, "messages", "send"]);
        Ok(url)
    }
}

/// 发送邮件并打印结果
///
/// 任何错误只记录日志，返回 `None`，调用方不做重试
pub async fn send(
    client: &GmailApiClient,
    user_id: &str,
    message: &EncodedMessage,
) -> Option<SendResult> {
    match client.send_message(user_id, message).await {
        Ok(result) => {
            tracing::info!("✅ 邮件发送成功 (labels: {:?})", result.label_ids);
            println!("Message Id: {} (thread: {})", result.id, result.thread_id);
            Some(result)
        }
        Err(e) => {
            tracing::error!("❌ 发送邮件失败: {:#}", e);
            None
        }
    }
}
