use serde::{Deserialize, Serialize};

/// Token 种类
///
/// 写入 claims 的 typ 字段，防止 refresh token 被当作 access token 使用。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
        }
    }
}

/// JWT Token Claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// JWT 标准字段 - 签发者
    pub iss: String,
    /// JWT 标准字段 - 主题 (用户ID)
    pub sub: String,
    /// JWT 标准字段 - 受众
    pub aud: String,
    /// JWT 标准字段 - 过期时间 (Unix timestamp)
    pub exp: i64,
    /// JWT 标准字段 - 签发时间
    pub iat: i64,
    /// JWT 标准字段 - JWT ID (用于撤销)
    pub jti: String,

    /// 自定义字段 - token 种类
    pub typ: TokenKind,
    /// 自定义字段 - 会话ID
    pub session_id: String,
    /// 自定义字段 - 设备ID
    pub device_id: String,
    /// 自定义字段 - 用户角色（透传，不在本核心内做权限判断）
    pub role: String,
}
