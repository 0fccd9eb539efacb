/// Gmail 凭据与 API 响应数据结构
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Token 刷新阈值（提前多少分钟视为过期）
pub const REFRESH_THRESHOLD_MINUTES: i64 = 5;

/// 未返回有效期时使用的默认值（秒）
pub const DEFAULT_EXPIRES_IN_SECS: u64 = 3600;

/// OAuth2 凭据
///
/// 字段布局与 Google 工具写出的 authorized-user JSON 一致，
/// 已有的 `token.json` 可以直接读取
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    /// 访问令牌
    pub token: String,

    /// 刷新令牌
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// 刷新时使用的 Token 端点
    pub token_uri: String,

    pub client_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,

    /// 已授权的权限范围
    #[serde(default)]
    pub scopes: Vec<String>,

    /// 过期时间（UTC），缺省表示不过期
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

impl Credential {
    /// 检查 Token 是否即将过期
    ///
    /// # Arguments
    /// * `threshold_minutes` - 提前多少分钟算作"即将过期"
    pub fn is_token_expiring(&self, threshold_minutes: i64) -> bool {
        match self.expiry {
            Some(expiry) => expiry <= Utc::now() + chrono::Duration::minutes(threshold_minutes),
            None => false,
        }
    }

    /// 凭据是否可以直接使用
    pub fn is_valid(&self) -> bool {
        !self.token.is_empty() && !self.is_token_expiring(REFRESH_THRESHOLD_MINUTES)
    }

    /// 是否覆盖全部请求的权限范围
    pub fn has_scopes(&self, requested: &[String]) -> bool {
        requested.iter().all(|scope| self.scopes.contains(scope))
    }

    /// 应用刷新结果
    ///
    /// 只更新 token 与过期时间；服务端轮换了刷新令牌时一并替换
    pub fn apply_refresh(&mut self, grant: TokenGrant) {
        self.expiry = Some(grant.expiry_from_now());
        self.token = grant.access_token;
        if let Some(refresh_token) = grant.refresh_token {
            self.refresh_token = Some(refresh_token);
        }
    }
}

/// Token 端点返回的授权结果
#[derive(Debug, Clone, PartialEq)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<Duration>,
    pub scopes: Option<Vec<String>>,
}

impl TokenGrant {
    /// 根据有效期计算过期时间
    ///
    /// 有效期超出 `DateTime` 可表示范围时按默认值处理
    pub fn expiry_from_now(&self) -> DateTime<Utc> {
        let now = Utc::now();
        let default = chrono::Duration::seconds(DEFAULT_EXPIRES_IN_SECS as i64);
        let secs = self
            .expires_in
            .unwrap_or(Duration::from_secs(DEFAULT_EXPIRES_IN_SECS))
            .as_secs();

        i64::try_from(secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .and_then(|lifetime| now.checked_add_signed(lifetime))
            .unwrap_or(now + default)
    }
}

/// `users.messages.send` 响应
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendResult {
    pub id: String,
    pub thread_id: String,
    #[serde(default)]
    pub label_ids: Vec<String>,
}
