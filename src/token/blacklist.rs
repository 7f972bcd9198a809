use chrono::Utc;
use dashmap::DashMap;
use tracing::debug;

/// Token 黑名单 (存储 jti -> exp)
///
/// 记录 exp 是为了让清理能判断条目何时可以安全丢弃：
/// token 自身过期后，签名验证已经拒绝它，黑名单条目就没有保留价值了。
pub struct TokenBlacklist {
    entries: DashMap<String, i64>,
}

impl TokenBlacklist {
    /// 创建新的黑名单
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// 消费一个 jti（轮换的原子检查并占用）
    ///
    /// 并发调用同一个 jti 时只有第一个返回 true，
    /// 其余看到"已在黑名单"返回 false。这是 refresh token
    /// 单次使用保证的核心：先到先得，后到必败。
    pub fn consume(&self, jti: &str, exp: i64) -> bool {
        self.entries.insert(jti.to_string(), exp).is_none()
    }

    /// 将 jti 加入黑名单（显式吊销，幂等）
    pub fn revoke(&self, jti: &str, exp: i64) {
        self.entries.insert(jti.to_string(), exp);
        debug!("jti 已加入黑名单: {}", jti);
    }

    /// 检查 jti 是否被撤销
    pub fn is_revoked(&self, jti: &str) -> bool {
        self.entries.contains_key(jti)
    }

    /// 清理 token 自身已过期的黑名单条目
    ///
    /// 可定期/并发调用，重复清理同一批条目不会出错。
    pub fn cleanup_expired(&self) -> usize {
        let now = Utc::now().timestamp();
        let before = self.entries.len();

        self.entries.retain(|_, exp| *exp > now);

        let cleaned = before - self.entries.len();
        if cleaned > 0 {
            debug!("🧹 黑名单清理完成: 清理了 {} 个过期条目", cleaned);
        }
        cleaned
    }

    /// 获取黑名单大小
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for TokenBlacklist {
    fn default() -> Self {
        Self::new()
    }
}
