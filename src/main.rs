use anyhow::{Context, Result};
use std::process::ExitCode;

mod config;
mod mail;
mod utils;

use mail::gmail::{self, GmailApiClient, OAuthClient};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // 1. 初始化日志
    init_logger()?;

    // 2. 加载配置
    let (cfg, cfg_path) = config::load()?;
    tracing::info!("使用配置文件: {}", cfg_path.display());
    cfg.message
        .validate()
        .with_context(|| format!("配置文件 {} 不完整", cfg_path.display()))?;

    // 3. 获取凭据（缓存 / 刷新 / 交互式授权）
    let authorizer = OAuthClient::new(&cfg.auth);
    let credential = gmail::acquire(&authorizer, &cfg.auth.token_file, &cfg.auth.scopes).await?;

    // 4. 创建 Gmail API 客户端
    let client = GmailApiClient::new(credential.token);

    // 5. 构建邮件（附件读取失败时不会发送）
    let msg = &cfg.message;
    let encoded = mail::mime::build(
        &msg.sender,
        &msg.recipient,
        &msg.subject,
        &msg.body,
        &msg.attachments,
    )
    .context("构建邮件失败")?;
    tracing::info!(
        "邮件已构建: {} -> {}，{} 个附件",
        msg.sender,
        msg.recipient,
        msg.attachments.len()
    );

    // 6. 发送
    match gmail::send(&client, &msg.user_id, &encoded).await {
        Some(_) => Ok(ExitCode::SUCCESS),
        None => Ok(ExitCode::FAILURE),
    }
}

/// 初始化日志系统
fn init_logger() -> Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gmail_send=info,warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}
