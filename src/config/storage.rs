/// Token 缓存存储模块
///
/// 负责将 [`Credential`] 持久化到 `token.json`
use anyhow::{Context, Result};
use std::path::Path;

use crate::mail::gmail::types::Credential;

/// 加载缓存的凭据
///
/// # Returns
/// 文件不存在时返回 `None`
///
/// # Errors
/// - 文件读取失败
/// - JSON 格式错误
pub fn load_credential(path: &Path) -> Result<Option<Credential>> {
    if !path.exists() {
        tracing::debug!("Token 缓存不存在: {}", path.display());
        return Ok(None);
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("读取 Token 缓存失败: {}", path.display()))?;

    let credential: Credential = serde_json::from_str(&content)
        .with_context(|| format!("解析 Token 缓存失败（文件可能损坏）: {}", path.display()))?;

    tracing::debug!("已加载 Token 缓存: {}", path.display());

    Ok(Some(credential))
}

/// 保存凭据
///
/// 覆盖式保存，父目录不存在时自动创建
pub fn save_credential(path: &Path, credential: &Credential) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("创建目录失败: {}", parent.display()))?;
    }

    let content = serde_json::to_string_pretty(credential).context("序列化凭据失败")?;

    std::fs::write(path, content)
        .with_context(|| format!("写入 Token 缓存失败: {}", path.display()))?;

    tracing::debug!("凭据已保存到: {}", path.display());

    Ok(())
}
