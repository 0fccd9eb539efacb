/// 凭据获取与刷新
use anyhow::{Context, Result};
use std::path::Path;

use crate::config::storage;
use crate::mail::gmail::oauth::Authorizer;
use crate::mail::gmail::types::Credential;

/// 获取可用的凭据
///
/// 1. 读取 Token 缓存
/// 2. 缓存有效且覆盖所需权限时直接返回（不访问网络、不写文件）
/// 3. 已过期但有 Refresh Token 时刷新；刷新失败则回退到交互式授权
/// 4. 其余情况运行交互式授权
/// 5. 将新凭据写回缓存
///
/// # Errors
/// - 交互式授权失败（客户端配置缺失、用户拒绝、超时等）
/// - 写入缓存失败
pub async fn acquire<A: Authorizer>(
    authorizer: &A,
    cache_path: &Path,
    scopes: &[String],
) -> Result<Credential> {
    let cached = match storage::load_credential(cache_path) {
        Ok(cached) => cached,
        Err(e) => {
            tracing::warn!("⚠️ Token 缓存不可用，将重新授权: {:#}", e);
            None
        }
    };

    // 未记录 scopes 的缓存按所请求的权限使用
    let covers = |credential: &Credential| {
        credential.scopes.is_empty() || credential.has_scopes(scopes)
    };

    let credential = match cached {
        Some(credential) if covers(&credential) && credential.is_valid() => {
            tracing::info!("✅ 使用缓存的 Access Token");
            return Ok(credential);
        }
        Some(mut credential)
            if covers(&credential) && credential.refresh_token.is_some() =>
        {
            tracing::info!("Access Token 已过期（{:?}），尝试刷新", credential.expiry);
            match authorizer.refresh(&credential).await {
                Ok(grant) => {
                    credential.apply_refresh(grant);
                    credential
                }
                Err(e) => {
                    tracing::warn!("⚠️ {}，改为重新授权", e);
                    authorizer.authorize().await.context("OAuth2 授权失败")?
                }
            }
        }
        Some(_) => {
            tracing::info!("缓存凭据无法续期或权限范围不足，需要重新授权");
            authorizer.authorize().await.context("OAuth2 授权失败")?
        }
        None => authorizer.authorize().await.context("OAuth2 授权失败")?,
    };

    storage::save_credential(cache_path, &credential).context("保存凭据失败")?;
    tracing::info!("✅ 凭据已保存: {}", cache_path.display());

    Ok(credential)
}
