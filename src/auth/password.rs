/// 密码加密和验证模块
///
/// 使用 bcrypt 算法进行密码加密（行业标准）

use bcrypt::{hash, verify, DEFAULT_COST};
use crate::error::{AuthError, Result};

/// 密码加密成本（默认值12，平衡安全和性能）
pub const PASSWORD_COST: u32 = DEFAULT_COST; // 12

/// 加密密码
///
/// 使用 bcrypt 算法将明文密码加密为哈希值（60字符）
pub fn hash_password(password: &str) -> Result<String> {
    hash(password, PASSWORD_COST)
        .map_err(|e| AuthError::Internal(format!("密码加密失败: {}", e)))
}

/// 验证密码
///
/// 比较明文密码和存储的哈希值是否匹配
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    verify(password, hash)
        .map_err(|e| AuthError::Internal(format!("密码验证失败: {}", e)))
}
