/// Gmail OAuth2 认证流程
///
/// 实现 OAuth2 授权码流程（带 PKCE）以及基于 Refresh Token 的续期
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, PkceCodeChallenge,
    PkceCodeVerifier, RedirectUrl, RefreshToken, RequestTokenError, Scope, TokenResponse,
    TokenUrl,
    basic::{BasicClient, BasicErrorResponse, BasicTokenResponse},
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tiny_http::{Header, Response, Server};
use tokio::sync::oneshot;
use url::Url;

use crate::config::{AuthSettings, oauth_config::OAuthConfig};
use crate::mail::gmail::types::{Credential, TokenGrant};

/// OAuth2 成功页面 HTML
const SUCCESS_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>授权成功</title>
    <style>
        body {
            font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Arial, sans-serif;
            text-align: center;
            padding-top: 80px;
            color: #444;
        }
        .checkmark { font-size: 64px; color: #4caf50; }
    </style>
</head>
<body>
    <div class="checkmark">✓</div>
    <h1>授权成功</h1>
    <p>已获得发送邮件的权限，可以关闭此页面并返回终端。</p>
</body>
</html>"#;

/// OAuth2 错误页面 HTML
const ERROR_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>授权失败</title>
    <style>
        body {
            font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Arial, sans-serif;
            text-align: center;
            padding-top: 80px;
            color: #444;
        }
        .cross { font-size: 64px; color: #f44336; }
    </style>
</head>
<body>
    <div class="cross">✗</div>
    <h1>授权失败</h1>
    <p>未能获得授权，请返回终端查看错误信息。</p>
</body>
</html>"#;

/// OAuth2 错误类型
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("OAuth2 客户端配置无效: {0}")]
    ClientConfig(String),

    #[error("无法启动本地回调服务器: {0}")]
    Listener(String),

    #[error("用户拒绝授权: {0}")]
    Denied(String),

    #[error("授权回调无效: {0}")]
    Callback(String),

    #[error("授权超时：用户未在 {0} 秒内完成授权")]
    Timeout(u64),

    #[error("CSRF 验证失败：state 不匹配")]
    StateMismatch,

    #[error("Token 交换失败: {0}")]
    Exchange(String),

    #[error("Refresh Token 交换失败: {0}")]
    Refresh(String),

    #[error("I/O 错误: {0}")]
    Io(#[from] std::io::Error),
}

/// 凭据获取的外部协作方
///
/// 刷新与交互式授权都会访问网络，凭据管理通过此 trait 调用它们
#[allow(async_fn_in_trait)]
pub trait Authorizer {
    /// 使用凭据中的 Refresh Token 换取新的 Access Token
    async fn refresh(&self, credential: &Credential) -> Result<TokenGrant, AuthError>;

    /// 运行完整的交互式授权码流程
    async fn authorize(&self) -> Result<Credential, AuthError>;
}

/// 基于 `oauth2` crate 的授权实现
pub struct OAuthClient {
    credentials_file: PathBuf,
    scopes: Vec<String>,
    callback_timeout_secs: u64,
    open_browser: bool,
}

/// 回调请求的解析结果
#[derive(Debug, PartialEq)]
enum CallbackParams {
    Code { code: String, state: String },
    Denied(String),
    Ignored,
}

impl OAuthClient {
    pub fn new(settings: &AuthSettings) -> Self {
        Self {
            credentials_file: settings.credentials_file.clone(),
            scopes: settings.scopes.clone(),
            callback_timeout_secs: settings.callback_timeout_secs,
            open_browser: settings.open_browser,
        }
    }
}

impl Authorizer for OAuthClient {
    async fn refresh(&self, credential: &Credential) -> Result<TokenGrant, AuthError> {
        tracing::debug!("开始刷新 Access Token");

        let refresh_token = credential
            .refresh_token
            .as_deref()
            .ok_or_else(|| AuthError::Refresh("凭据中没有 Refresh Token".to_string()))?;

        let client = build_client(
            &credential.client_id,
            credential.client_secret.as_deref(),
            // 刷新不会用到授权端点，这里只是满足 BasicClient 的构造参数
            crate::config::oauth_config::DEFAULT_AUTH_URI,
            &credential.token_uri,
        )
        .map_err(|e| AuthError::Refresh(e.to_string()))?;

        let token_response = client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
            .request_async(oauth2::reqwest::async_http_client)
            .await
            .map_err(|e| {
                let error_msg = describe_token_error(&e);
                if error_msg.contains("invalid_grant") {
                    tracing::error!("❌ Token 刷新失败 [授权被撤销/已过期]: {}", error_msg);
                }
                AuthError::Refresh(error_msg)
            })?;

        let grant = grant_from_response(&token_response);
        tracing::info!("✅ Access Token 刷新成功");
        Ok(grant)
    }

    /// 完整流程：
    /// 1. 加载客户端配置
    /// 2. 启动本地服务器（临时端口）
    /// 3. 生成授权 URL 并打开浏览器
    /// 4. 等待回调（带超时）
    /// 5. 验证 CSRF state
    /// 6. 交换 Token
    async fn authorize(&self) -> Result<Credential, AuthError> {
        tracing::info!("🔐 开始 Gmail OAuth2 认证流程");

        // 步骤 1：加载配置
        let config = OAuthConfig::load(&self.credentials_file)?;

        // 步骤 2：启动本地服务器
        let server = Server::http("127.0.0.1:0").map_err(|e| AuthError::Listener(e.to_string()))?;
        let port = server
            .server_addr()
            .to_ip()
            .map(|addr| addr.port())
            .ok_or_else(|| AuthError::Listener("监听地址不是 TCP 地址".to_string()))?;
        let server = Arc::new(server);
        tracing::info!("✅ 本地服务器启动成功: http://localhost:{}", port);

        // 步骤 3：生成授权 URL
        let redirect_uri = redirect_uri(port);
        let client = build_client(
            &config.client_id,
            config.client_secret.as_deref(),
            &config.auth_uri,
            &config.token_uri,
        )?
        .set_redirect_uri(
            RedirectUrl::new(redirect_uri).map_err(|e| AuthError::ClientConfig(e.to_string()))?,
        );

        let (auth_url, csrf_state, pkce_verifier) = authorization_url(&client, &self.scopes);
        tracing::debug!("授权 URL: {}", auth_url);

        let (code_tx, code_rx) = oneshot::channel();
        let listener = Arc::clone(&server);
        let server_handle = std::thread::spawn(move || {
            let outcome = wait_for_callback(&listener);
            code_tx.send(outcome).ok();
        });

        println!("请在浏览器中打开以下地址完成授权:\n{}", auth_url);
        if self.open_browser {
            match webbrowser::open(auth_url.as_str()) {
                Ok(()) => tracing::info!("✅ 浏览器已打开，等待用户授权..."),
                Err(e) => tracing::warn!("⚠️ 无法打开浏览器，请手动复制上面的 URL: {}", e),
            }
        }

        // 步骤 4：等待回调（带超时）
        let outcome = match tokio::time::timeout(
            Duration::from_secs(self.callback_timeout_secs),
            code_rx,
        )
        .await
        {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(AuthError::Callback("回调线程意外退出".to_string())),
            Err(_) => {
                server.unblock();
                server_handle.join().ok();
                return Err(AuthError::Timeout(self.callback_timeout_secs));
            }
        };

        server_handle
            .join()
            .map_err(|_| AuthError::Callback("服务器线程 panic".to_string()))?;
        drop(server);

        let (received_code, received_state) = outcome?;
        tracing::info!("✅ 收到授权回调");

        // 步骤 5：验证 CSRF state
        if received_state.secret() != csrf_state.secret() {
            return Err(AuthError::StateMismatch);
        }
        tracing::info!("✅ CSRF 验证通过");

        // 步骤 6：交换 Token
        let token_response = client
            .exchange_code(received_code)
            .set_pkce_verifier(pkce_verifier)
            .request_async(oauth2::reqwest::async_http_client)
            .await
            .map_err(|e| {
                tracing::error!("Token 交换详细错误: {:?}", e);
                AuthError::Exchange(describe_token_error(&e))
            })?;

        let grant = grant_from_response(&token_response);
        if grant.refresh_token.is_none() {
            tracing::warn!("⚠️ 未收到 refresh_token，Token 过期后需要重新授权");
        }

        tracing::info!("✅ Token 交换成功");
        tracing::debug!("Access Token: {}...", preview(&grant.access_token));

        let expiry = grant.expiry_from_now();
        Ok(Credential {
            token: grant.access_token,
            refresh_token: grant.refresh_token,
            token_uri: config.token_uri,
            client_id: config.client_id,
            client_secret: config.client_secret,
            scopes: grant.scopes.unwrap_or_else(|| self.scopes.clone()),
            expiry: Some(expiry),
        })
    }
}

/// 构建 OAuth2 客户端
fn build_client(
    client_id: &str,
    client_secret: Option<&str>,
    auth_uri: &str,
    token_uri: &str,
) -> Result<BasicClient, AuthError> {
    let auth_url = AuthUrl::new(auth_uri.to_string())
        .map_err(|e| AuthError::ClientConfig(format!("auth_uri 无效: {}", e)))?;
    let token_url = TokenUrl::new(token_uri.to_string())
        .map_err(|e| AuthError::ClientConfig(format!("token_uri 无效: {}", e)))?;

    Ok(BasicClient::new(
        ClientId::new(client_id.to_string()),
        client_secret.map(|s| ClientSecret::new(s.to_string())),
        auth_url,
        Some(token_url),
    ))
}

fn redirect_uri(port: u16) -> String {
    format!("http://localhost:{}/", port)
}

/// 生成授权 URL
///
/// 使用 PKCE (RFC 7636)，并请求离线访问以获得 Refresh Token
fn authorization_url(
    client: &BasicClient,
    scopes: &[String],
) -> (Url, CsrfToken, PkceCodeVerifier) {
    let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

    let (auth_url, csrf_state) = client
        .authorize_url(CsrfToken::new_random)
        .add_scopes(scopes.iter().map(|s| Scope::new(s.clone())))
        .add_extra_param("access_type", "offline")
        .set_pkce_challenge(pkce_challenge)
        .url();

    (auth_url, csrf_state, pkce_verifier)
}

/// 阻塞等待授权回调，直到收到 code 或 error
fn wait_for_callback(server: &Server) -> Result<(AuthorizationCode, CsrfToken), AuthError> {
    for request in server.incoming_requests() {
        tracing::debug!("收到请求: {}", request.url());

        let params = match parse_callback(request.url()) {
            Ok(params) => params,
            Err(e) => {
                tracing::error!("回调参数无效: {}", e);
                request.respond(html_response(ERROR_HTML, 400))?;
                return Err(e);
            }
        };

        match params {
            CallbackParams::Code { code, state } => {
                request.respond(html_response(SUCCESS_HTML, 200))?;
                return Ok((AuthorizationCode::new(code), CsrfToken::new(state)));
            }
            CallbackParams::Denied(error) => {
                tracing::error!("用户拒绝授权: {}", error);
                request.respond(html_response(ERROR_HTML, 400))?;
                return Err(AuthError::Denied(error));
            }
            CallbackParams::Ignored => {
                request.respond(Response::from_string("Not Found").with_status_code(404))?;
            }
        }
    }

    Err(AuthError::Callback("本地服务器在收到回调前已关闭".to_string()))
}

/// 解析回调请求的 query 参数
fn parse_callback(path: &str) -> Result<CallbackParams, AuthError> {
    let url = Url::parse(&format!("http://localhost{}", path))
        .map_err(|e| AuthError::Callback(e.to_string()))?;

    let params: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();

    if let Some(error) = params.get("error") {
        return Ok(CallbackParams::Denied(error.clone()));
    }

    match (params.get("code"), params.get("state")) {
        (Some(code), Some(state)) => Ok(CallbackParams::Code {
            code: code.clone(),
            state: state.clone(),
        }),
        (Some(_), None) => Err(AuthError::Callback("回调缺少 state 参数".to_string())),
        _ => Ok(CallbackParams::Ignored),
    }
}

fn html_response(body: &str, status: u16) -> Response<std::io::Cursor<Vec<u8>>> {
    let response = Response::from_data(body.as_bytes().to_vec()).with_status_code(status);
    match Header::from_bytes(&b"Content-Type"[..], &b"text/html; charset=utf-8"[..]) {
        Ok(header) => response.with_header(header),
        Err(()) => response,
    }
}

fn grant_from_response(response: &BasicTokenResponse) -> TokenGrant {
    TokenGrant {
        access_token: response.access_token().secret().to_string(),
        refresh_token: response.refresh_token().map(|t| t.secret().to_string()),
        expires_in: response.expires_in(),
        scopes: response
            .scopes()
            .map(|scopes| scopes.iter().map(|s| s.to_string()).collect()),
    }
}

/// 提取服务端返回的错误码（如 invalid_grant），其余错误使用 Display
fn describe_token_error<RE>(err: &RequestTokenError<RE, BasicErrorResponse>) -> String
where
    RE: std::error::Error + 'static,
{
    match err {
        RequestTokenError::ServerResponse(response) => response.to_string(),
        other => other.to_string(),
    }
}

fn preview(secret: &str) -> &str {
    let end = secret
        .char_indices()
        .nth(5)
        .map(|(i, _)| i)
        .unwrap_or(secret.len());
    &secret[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::test_server;

    fn expired_credential(token_uri: String) -> Credential {
        Credential {
            token: "old-token".to_string(),
            refresh_token: Some("refresh-123".to_string()),
            token_uri,
            client_id: "client-id".to_string(),
            client_secret: Some("client-secret".to_string()),
            scopes: vec![crate::config::oauth_config::SEND_SCOPE.to_string()],
            expiry: Some(chrono::Utc::now() - chrono::Duration::hours(1)),
        }
    }

    fn oauth_client(dir: &std::path::Path) -> OAuthClient {
        OAuthClient::new(&AuthSettings {
            credentials_file: dir.join("credentials.json"),
            open_browser: false,
            ..AuthSettings::default()
        })
    }

    #[test]
    fn test_html_contains_charset() {
        assert!(SUCCESS_HTML.contains("utf-8"));
        assert!(ERROR_HTML.contains("utf-8"));
    }

    #[test]
    fn test_parse_callback_with_code() {
        let params = parse_callback("/?state=abc&code=4%2F0Ad&scope=gmail.send").unwrap();
        assert_eq!(
            params,
            CallbackParams::Code {
                code: "4/0Ad".to_string(),
                state: "abc".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_callback_denied() {
        let params = parse_callback("/?error=access_denied&state=abc").unwrap();
        assert_eq!(params, CallbackParams::Denied("access_denied".to_string()));
    }

    #[test]
    fn test_parse_callback_ignores_unrelated_requests() {
        assert_eq!(parse_callback("/favicon.ico").unwrap(), CallbackParams::Ignored);
    }

    #[test]
    fn test_parse_callback_missing_state() {
        let err = parse_callback("/?code=abc").unwrap_err();
        assert!(matches!(err, AuthError::Callback(_)));
    }

    #[test]
    fn test_authorization_url_contents() {
        let client = build_client(
            "client-id",
            Some("secret"),
            crate::config::oauth_config::DEFAULT_AUTH_URI,
            crate::config::oauth_config::DEFAULT_TOKEN_URI,
        )
        .unwrap()
        .set_redirect_uri(RedirectUrl::new(redirect_uri(8765)).unwrap());

        let scopes = vec![crate::config::oauth_config::SEND_SCOPE.to_string()];
        let (url, csrf_state, _verifier) = authorization_url(&client, &scopes);

        let params: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(params["client_id"], "client-id");
        assert_eq!(params["redirect_uri"], "http://localhost:8765/");
        assert_eq!(params["scope"], scopes[0]);
        assert_eq!(params["access_type"], "offline");
        assert_eq!(params["code_challenge_method"], "S256");
        assert_eq!(params["state"], *csrf_state.secret());
    }

    #[test]
    fn test_preview_truncates() {
        assert_eq!(preview("ya29.a0AfH6"), "ya29.");
        assert_eq!(preview("abc"), "abc");
    }

    #[tokio::test]
    async fn test_refresh_against_token_endpoint() {
        let server = test_server::serve_once(
            200,
            "application/json",
            r#"{"access_token": "new-token", "token_type": "Bearer", "expires_in": 3599}"#,
        );
        let dir = tempfile::tempdir().unwrap();
        let credential = expired_credential(format!("{}/token", server.base_url));

        let grant = oauth_client(dir.path()).refresh(&credential).await.unwrap();
        assert_eq!(grant.access_token, "new-token");
        assert_eq!(grant.expires_in, Some(Duration::from_secs(3599)));
        assert!(grant.refresh_token.is_none());

        let request = server.captured();
        assert_eq!(request.method, "POST");
        assert_eq!(request.url, "/token");
        assert!(request.body.contains("grant_type=refresh_token"));
        assert!(request.body.contains("refresh_token=refresh-123"));
    }

    #[tokio::test]
    async fn test_refresh_revoked_token_is_refresh_error() {
        let server = test_server::serve_once(
            400,
            "application/json",
            r#"{"error": "invalid_grant", "error_description": "Token has been expired or revoked."}"#,
        );
        let dir = tempfile::tempdir().unwrap();
        let credential = expired_credential(format!("{}/token", server.base_url));

        let err = oauth_client(dir.path()).refresh(&credential).await.unwrap_err();
        match err {
            AuthError::Refresh(msg) => assert!(msg.contains("invalid_grant")),
            other => panic!("unexpected error: {other:?}"),
        }
        server.captured();
    }

    #[tokio::test]
    async fn test_refresh_without_refresh_token() {
        let dir = tempfile::tempdir().unwrap();
        let mut credential = expired_credential("http://127.0.0.1:9/token".to_string());
        credential.refresh_token = None;

        let err = oauth_client(dir.path()).refresh(&credential).await.unwrap_err();
        assert!(matches!(err, AuthError::Refresh(_)));
    }

    /// 在后台线程等待回调，返回回调地址与结果
    fn spawn_callback_listener() -> (
        String,
        std::thread::JoinHandle<Result<(AuthorizationCode, CsrfToken), AuthError>>,
    ) {
        let server = Server::http("127.0.0.1:0").unwrap();
        let port = server.server_addr().to_ip().unwrap().port();
        let handle = std::thread::spawn(move || wait_for_callback(&server));
        (format!("http://127.0.0.1:{}", port), handle)
    }

    #[tokio::test]
    async fn test_callback_without_state_gets_error_page() {
        let (base, handle) = spawn_callback_listener();

        let response = crate::utils::http_client::get_client()
            .get(format!("{}/?code=abc", base))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 400);
        assert!(response.text().await.unwrap().contains("授权失败"));

        let err = handle.join().unwrap().unwrap_err();
        assert!(matches!(err, AuthError::Callback(_)));
    }

    #[tokio::test]
    async fn test_callback_skips_unrelated_requests() {
        let (base, handle) = spawn_callback_listener();
        let client = crate::utils::http_client::get_client();

        let favicon = client.get(format!("{}/favicon.ico", base)).send().await.unwrap();
        assert_eq!(favicon.status(), 404);

        let callback = client
            .get(format!("{}/?code=abc&state=xyz", base))
            .send()
            .await
            .unwrap();
        assert_eq!(callback.status(), 200);

        let (code, state) = handle.join().unwrap().unwrap();
        assert_eq!(code.secret(), "abc");
        assert_eq!(state.secret(), "xyz");
    }

    #[tokio::test]
    async fn test_authorize_without_client_config_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = oauth_client(dir.path()).authorize().await.unwrap_err();
        assert!(matches!(err, AuthError::ClientConfig(_)));
    }
}
