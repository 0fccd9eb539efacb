use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub mod oauth_config;
pub mod storage;

use oauth_config::SEND_SCOPE;

/// 工作目录下的配置文件名（优先于全局配置）
const LOCAL_CONFIG_FILE: &str = "gmail-send.toml";

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub auth: AuthSettings,
    pub message: MessageSettings,
}

/// OAuth2 相关设置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    /// OAuth2 客户端配置文件（只读）
    pub credentials_file: PathBuf,

    /// Token 缓存文件（读写）
    pub token_file: PathBuf,

    /// 请求的 API 权限范围
    pub scopes: Vec<String>,

    /// 等待浏览器回调的最长时间（秒）
    pub callback_timeout_secs: u64,

    /// 是否自动打开浏览器
    pub open_browser: bool,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            credentials_file: PathBuf::from("credentials.json"),
            token_file: PathBuf::from("token.json"),
            scopes: vec![SEND_SCOPE.to_string()],
            callback_timeout_secs: 300,
            open_browser: true,
        }
    }
}

/// 待发送邮件的内容
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageSettings {
    pub sender: String,
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub attachments: Vec<PathBuf>,

    /// Gmail API 用户标识，`me` 表示当前授权账户
    pub user_id: String,
}

impl Default for MessageSettings {
    fn default() -> Self {
        Self {
            sender: String::new(),
            recipient: String::new(),
            subject: "Test email with attachments".to_string(),
            body: "Hello, this is a test email sent using the Gmail API with OAuth 2.0."
                .to_string(),
            attachments: Vec::new(),
            user_id: "me".to_string(),
        }
    }
}

impl MessageSettings {
    /// 检查必填字段
    pub fn validate(&self) -> Result<()> {
        if self.sender.trim().is_empty() {
            anyhow::bail!("未设置发件人：请在配置文件 [message] 段中填写 sender");
        }
        if self.recipient.trim().is_empty() {
            anyhow::bail!("未设置收件人：请在配置文件 [message] 段中填写 recipient");
        }
        Ok(())
    }
}

/// 获取配置文件路径
///
/// 工作目录下存在 `gmail-send.toml` 时使用它，否则使用
/// `<config_dir>/GmailSend/config.toml`
pub fn config_path() -> Result<PathBuf> {
    let local = PathBuf::from(LOCAL_CONFIG_FILE);
    if local.exists() {
        return Ok(local);
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| anyhow::anyhow!("无法获取配置目录"))?
        .join("GmailSend");

    std::fs::create_dir_all(&config_dir)?;
    Ok(config_dir.join("config.toml"))
}

/// 加载配置
///
/// 返回配置以及实际使用的文件路径（用于错误提示）
pub fn load() -> Result<(Config, PathBuf)> {
    let path = config_path()?;
    let config = load_from(&path)?;
    Ok((config, path))
}

/// 从指定路径加载配置，文件不存在时写入默认配置
pub fn load_from(path: &Path) -> Result<Config> {
    if !path.exists() {
        tracing::info!("配置文件不存在，写入默认配置: {}", path.display());
        let config = Config::default();
        save_to(path, &config)?;
        return Ok(config);
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("读取配置文件失败: {}", path.display()))?;
    let config: Config = toml::from_str(&content)
        .with_context(|| format!("解析配置文件失败: {}", path.display()))?;
    Ok(config)
}

/// 保存配置
pub fn save_to(path: &Path, config: &Config) -> Result<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)
        .with_context(|| format!("写入配置文件失败: {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.auth.credentials_file, PathBuf::from("credentials.json"));
        assert_eq!(config.auth.token_file, PathBuf::from("token.json"));
        assert_eq!(config.auth.scopes, vec![SEND_SCOPE.to_string()]);
        assert_eq!(config.message.user_id, "me");
        assert!(config.message.attachments.is_empty());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [message]
            sender = "a@x.com"
            recipient = "b@y.com"
            attachments = ["docs/resume.pdf", "notes.txt"]
            "#,
        )
        .unwrap();

        assert_eq!(config.message.sender, "a@x.com");
        assert_eq!(config.message.attachments.len(), 2);
        assert_eq!(config.message.user_id, "me");
        assert_eq!(config.auth.callback_timeout_secs, 300);
        assert!(config.auth.open_browser);
    }

    #[test]
    fn test_validate_requires_addresses() {
        let mut settings = MessageSettings::default();
        assert!(settings.validate().is_err());

        settings.sender = "a@x.com".to_string();
        assert!(settings.validate().is_err());

        settings.recipient = "b@y.com".to_string();
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_load_from_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let config = load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.message.user_id, "me");

        // 再次加载读取的是刚写入的文件
        let reloaded = load_from(&path).unwrap();
        assert_eq!(reloaded.auth.scopes, config.auth.scopes);
    }

    #[test]
    fn test_load_from_rejects_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[message\nsender = ").unwrap();

        let err = load_from(&path).unwrap_err();
        assert!(err.to_string().contains("解析配置文件失败"));
    }
}
