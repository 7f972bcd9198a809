use std::fmt;
use std::error::Error as StdError;
use serde::{Serialize, Deserialize};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response, Json},
};

/// 认证核心错误类型
///
/// 凭证类错误和 Token 类错误必须保持类型区分，
/// 调用方依赖类型决定"提示重新登录"还是"静默刷新"。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AuthError {
    /// 内部错误
    Internal(String),
    /// 配置错误
    Configuration(String),
    /// 验证错误
    Validation(String),
    /// 序列化错误
    Serialization(String),
    /// 超时错误
    Timeout(String),
    /// 凭证错误（邮箱或密码不匹配）
    InvalidCredentials,
    /// 账号已锁定
    AccountLocked(String),
    /// 登录失败次数过多
    TooManyAttempts(String),
    /// Token 已过期
    TokenExpired,
    /// Token 无效（格式错误/签名错误）
    TokenInvalid(String),
    /// Token 已被撤销（轮换消费或显式吊销）
    TokenRevoked(String),
    /// 会话已失效（Token 仍有效但会话已终止）
    SessionExpired(String),
    /// 会话不存在
    SessionNotFound(String),
    /// 用户不存在
    UserNotFound(String),
    /// 设备不存在
    DeviceNotFound(String),
    /// CSRF token 不匹配
    CsrfMismatch,
    /// 设备与认证用户不匹配
    DeviceMismatch(String),
    /// 未授权（连接未携带 token 等）
    Unauthorized(String),
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::Internal(msg) => write!(f, "Internal error: {}", msg),
            AuthError::Configuration(msg) => write!(f, "Configuration error: {}", msg),
            AuthError::Validation(msg) => write!(f, "Validation error: {}", msg),
            AuthError::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            AuthError::Timeout(msg) => write!(f, "Timeout error: {}", msg),
            AuthError::InvalidCredentials => write!(f, "Invalid email or password"),
            AuthError::AccountLocked(msg) => write!(f, "Account locked: {}", msg),
            AuthError::TooManyAttempts(msg) => write!(f, "Too many login attempts: {}", msg),
            AuthError::TokenExpired => write!(f, "Token expired"),
            AuthError::TokenInvalid(msg) => write!(f, "Invalid token: {}", msg),
            AuthError::TokenRevoked(msg) => write!(f, "Token revoked: {}", msg),
            AuthError::SessionExpired(id) => write!(f, "Session expired: {}", id),
            AuthError::SessionNotFound(id) => write!(f, "Session not found: {}", id),
            AuthError::UserNotFound(id) => write!(f, "User not found: {}", id),
            AuthError::DeviceNotFound(id) => write!(f, "Device not found: {}", id),
            AuthError::CsrfMismatch => write!(f, "CSRF token mismatch"),
            AuthError::DeviceMismatch(msg) => write!(f, "Device mismatch: {}", msg),
            AuthError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
        }
    }
}

impl StdError for AuthError {}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status_code = match &self {
            AuthError::InvalidCredentials
            | AuthError::TokenExpired
            | AuthError::TokenInvalid(_)
            | AuthError::TokenRevoked(_)
            | AuthError::SessionExpired(_)
            | AuthError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AuthError::CsrfMismatch | AuthError::DeviceMismatch(_) => StatusCode::FORBIDDEN,
            AuthError::AccountLocked(_) => StatusCode::LOCKED,
            AuthError::TooManyAttempts(_) => StatusCode::TOO_MANY_REQUESTS,
            AuthError::Validation(_) => StatusCode::BAD_REQUEST,
            AuthError::SessionNotFound(_)
            | AuthError::UserNotFound(_)
            | AuthError::DeviceNotFound(_) => StatusCode::NOT_FOUND,
            AuthError::Timeout(_) => StatusCode::REQUEST_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let error_response = ErrorResponse::new(&self);
        (status_code, Json(error_response)).into_response()
    }
}

impl From<std::io::Error> for AuthError {
    fn from(err: std::io::Error) -> Self {
        AuthError::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for AuthError {
    fn from(err: serde_json::Error) -> Self {
        AuthError::Serialization(err.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for AuthError {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        AuthError::Timeout(err.to_string())
    }
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, AuthError>;

/// 错误代码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    /// 成功
    Success = 0,
    /// 内部错误
    Internal = 1000,
    /// 配置错误
    Configuration = 1001,
    /// 验证错误
    Validation = 1002,
    /// 序列化错误
    Serialization = 1003,
    /// 超时错误
    Timeout = 1004,
    /// 凭证错误
    InvalidCredentials = 2000,
    /// 账号已锁定
    AccountLocked = 2001,
    /// 登录失败次数过多
    TooManyAttempts = 2002,
    /// Token 已过期
    TokenExpired = 3000,
    /// Token 无效
    TokenInvalid = 3001,
    /// Token 已被撤销
    TokenRevoked = 3002,
    /// 会话已失效
    SessionExpired = 4000,
    /// 会话不存在
    SessionNotFound = 4001,
    /// 用户不存在
    UserNotFound = 4002,
    /// 设备不存在
    DeviceNotFound = 4003,
    /// CSRF token 不匹配
    CsrfMismatch = 5000,
    /// 设备不匹配
    DeviceMismatch = 5001,
    /// 未授权
    Unauthorized = 5002,
}

impl From<&AuthError> for ErrorCode {
    fn from(error: &AuthError) -> Self {
        match error {
            AuthError::Internal(_) => ErrorCode::Internal,
            AuthError::Configuration(_) => ErrorCode::Configuration,
            AuthError::Validation(_) => ErrorCode::Validation,
            AuthError::Serialization(_) => ErrorCode::Serialization,
            AuthError::Timeout(_) => ErrorCode::Timeout,
            AuthError::InvalidCredentials => ErrorCode::InvalidCredentials,
            AuthError::AccountLocked(_) => ErrorCode::AccountLocked,
            AuthError::TooManyAttempts(_) => ErrorCode::TooManyAttempts,
            AuthError::TokenExpired => ErrorCode::TokenExpired,
            AuthError::TokenInvalid(_) => ErrorCode::TokenInvalid,
            AuthError::TokenRevoked(_) => ErrorCode::TokenRevoked,
            AuthError::SessionExpired(_) => ErrorCode::SessionExpired,
            AuthError::SessionNotFound(_) => ErrorCode::SessionNotFound,
            AuthError::UserNotFound(_) => ErrorCode::UserNotFound,
            AuthError::DeviceNotFound(_) => ErrorCode::DeviceNotFound,
            AuthError::CsrfMismatch => ErrorCode::CsrfMismatch,
            AuthError::DeviceMismatch(_) => ErrorCode::DeviceMismatch,
            AuthError::Unauthorized(_) => ErrorCode::Unauthorized,
        }
    }
}

/// 错误响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// 错误代码
    pub code: ErrorCode,
    /// 错误消息
    pub message: String,
    /// 时间戳
    pub timestamp: u64,
}

impl ErrorResponse {
    /// 创建错误响应
    pub fn new(error: &AuthError) -> Self {
        Self {
            code: ErrorCode::from(error),
            message: error.to_string(),
            timestamp: chrono::Utc::now().timestamp() as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        assert_eq!(
            ErrorCode::from(&AuthError::InvalidCredentials),
            ErrorCode::InvalidCredentials
        );
        assert_eq!(ErrorCode::from(&AuthError::TokenExpired), ErrorCode::TokenExpired);
        assert_eq!(
            ErrorCode::from(&AuthError::TokenRevoked("rotated".to_string())),
            ErrorCode::TokenRevoked
        );
        assert_eq!(ErrorCode::from(&AuthError::CsrfMismatch), ErrorCode::CsrfMismatch);
    }

    #[test]
    fn test_token_errors_stay_distinct() {
        // 过期 / 无效 / 撤销 三类错误不能合并，
        // 客户端用它们区分"静默刷新"和"强制重新登录"
        let expired = AuthError::TokenExpired.to_string();
        let invalid = AuthError::TokenInvalid("signature verification failed".to_string()).to_string();
        let revoked = AuthError::TokenRevoked("consumed by rotation".to_string()).to_string();

        assert!(expired.contains("expired"));
        assert!(invalid.contains("signature"));
        assert!(revoked.contains("revoked"));
    }
}
