/// MIME 邮件构建模块
///
/// 组装 multipart/mixed 邮件（HTML 正文 + 固定签名 + 二进制附件），
/// 并编码为 Gmail API 需要的 `{"raw": ...}` 格式
use base64::{Engine, engine::general_purpose::URL_SAFE};
use lettre::Message;
use lettre::address::AddressError;
use lettre::message::header::{ContentTransferEncoding, ContentType};
use lettre::message::{Attachment, Body, Mailbox, MultiPart, SinglePart};
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// 正文与签名之间的换行
pub const BODY_SEPARATOR: &str = "<br><br>";

/// 固定签名（灰色小字）
pub const SIGNATURE: &str = concat!(
    r#"<div style="font-family:Arial, sans-serif; font-size:11px; color:#6e6e6e; line-height:1.4;">"#,
    "<br><br>",
    "Best regards,<br>",
    "Sent with gmail-send",
    "</div>",
);

/// 附件统一使用的 MIME 类型
const ATTACHMENT_CONTENT_TYPE: &str = "application/octet-stream";

/// 邮件构建错误
#[derive(Debug, Error)]
pub enum ComposeError {
    #[error("邮箱地址无效 {field}: {value}")]
    Address {
        field: &'static str,
        value: String,
        #[source]
        source: AddressError,
    },

    #[error("无法读取附件 {}", path.display())]
    Attachment {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("附件路径没有文件名: {}", .0.display())]
    FileName(PathBuf),

    #[error("无效的 Content-Type: {0}")]
    ContentType(String),

    #[error("附件无法使用 base64 编码: {0}")]
    Encoding(String),

    #[error("构建邮件失败: {0}")]
    Build(#[from] lettre::error::Error),
}

/// Gmail API 发送信封
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EncodedMessage {
    /// base64url 编码的完整 MIME 报文
    pub raw: String,
}

/// 已读入内存的附件
struct LoadedAttachment {
    filename: String,
    content: Vec<u8>,
}

/// 正文 + 分隔符 + 签名
pub fn html_body(text: &str) -> String {
    format!("{}{}{}", text, BODY_SEPARATOR, SIGNATURE)
}

/// 取路径的文件名部分作为附件名
pub fn attachment_filename(path: &Path) -> Result<String, ComposeError> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| ComposeError::FileName(path.to_path_buf()))
}

/// 构建带附件的邮件
///
/// 所有附件会先完整读入内存，任一附件读取失败都不会产生邮件
///
/// # Errors
/// - 发件人/收件人地址无效
/// - 附件不可读或路径没有文件名
pub fn build<P: AsRef<Path>>(
    sender: &str,
    recipient: &str,
    subject: &str,
    body_text: &str,
    attachments: &[P],
) -> Result<EncodedMessage, ComposeError> {
    let from = parse_mailbox("from", sender)?;
    let to = parse_mailbox("to", recipient)?;

    let loaded = attachments
        .iter()
        .map(|path| load_attachment(path.as_ref()))
        .collect::<Result<Vec<_>, _>>()?;

    let content_type = ContentType::parse(ATTACHMENT_CONTENT_TYPE)
        .map_err(|e| ComposeError::ContentType(e.to_string()))?;

    let mut container = MultiPart::mixed().singlepart(SinglePart::html(html_body(body_text)));
    for attachment in loaded {
        let body = Body::new_with_encoding(attachment.content, ContentTransferEncoding::Base64)
            .map_err(|_| ComposeError::Encoding(attachment.filename.clone()))?;
        container = container
            .singlepart(Attachment::new(attachment.filename).body(body, content_type.clone()));
    }

    let message = Message::builder()
        .from(from)
        .to(to)
        .subject(subject)
        .multipart(container)?;

    let raw = URL_SAFE.encode(message.formatted());

    tracing::debug!(
        "邮件已构建: {} 个附件, 编码后 {} 字节",
        attachments.len(),
        raw.len()
    );

    Ok(EncodedMessage { raw })
}

fn parse_mailbox(field: &'static str, value: &str) -> Result<Mailbox, ComposeError> {
    value.parse().map_err(|source| ComposeError::Address {
        field,
        value: value.to_string(),
        source,
    })
}

fn load_attachment(path: &Path) -> Result<LoadedAttachment, ComposeError> {
    let filename = attachment_filename(path)?;
    let content = std::fs::read(path).map_err(|source| ComposeError::Attachment {
        path: path.to_path_buf(),
        source,
    })?;

    tracing::debug!("读取附件 {} ({} 字节)", filename, content.len());

    Ok(LoadedAttachment { filename, content })
}
