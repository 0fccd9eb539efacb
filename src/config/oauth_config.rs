/// OAuth2 客户端配置读取模块
///
/// 解析 Google Cloud Console 下载的 `credentials.json`（installed / web 两种格式）
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::mail::gmail::oauth::AuthError;

/// 仅允许发送邮件的权限范围（无读取/修改权限）
pub const SEND_SCOPE: &str = "https://www.googleapis.com/auth/gmail.send";

/// Google 授权端点
pub const DEFAULT_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";

/// Google Token 端点
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// OAuth2 客户端配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthConfig {
    /// OAuth2 客户端 ID
    pub client_id: String,

    /// OAuth2 客户端密钥（公共客户端可以没有）
    #[serde(default)]
    pub client_secret: Option<String>,

    /// 授权端点
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,

    /// Token 端点
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_auth_uri() -> String {
    DEFAULT_AUTH_URI.to_string()
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// `credentials.json` 顶层结构
#[derive(Debug, Deserialize)]
struct ClientSecretsFile {
    installed: Option<OAuthConfig>,
    web: Option<OAuthConfig>,
}

impl OAuthConfig {
    /// 从 `credentials.json` 加载客户端配置
    ///
    /// # Errors
    /// 文件缺失、JSON 格式错误、缺少 installed/web 段或 client_id 为空时
    /// 返回 [`AuthError::ClientConfig`]
    pub fn load(path: &Path) -> Result<Self, AuthError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            AuthError::ClientConfig(format!("无法读取 {}: {}", path.display(), e))
        })?;

        let config = Self::from_json(&content)?;
        tracing::info!("✅ 已加载 OAuth2 客户端配置: {}", path.display());
        Ok(config)
    }

    /// 解析 client secrets JSON
    pub fn from_json(content: &str) -> Result<Self, AuthError> {
        let file: ClientSecretsFile = serde_json::from_str(content)
            .map_err(|e| AuthError::ClientConfig(format!("JSON 格式错误: {}", e)))?;

        let config = file.installed.or(file.web).ok_or_else(|| {
            AuthError::ClientConfig("缺少 \"installed\" 或 \"web\" 段".to_string())
        })?;

        if config.is_placeholder() {
            return Err(AuthError::ClientConfig("client_id 为空".to_string()));
        }

        Ok(config)
    }

    /// 验证配置是否未填写
    pub fn is_placeholder(&self) -> bool {
        self.client_id.trim().is_empty()
    }
}
