/// 邮件模块 - Gmail 认证/发送与 MIME 构建
pub mod gmail;
pub mod mime;
