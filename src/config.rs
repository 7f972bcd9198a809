use std::env;
use std::fs;
use std::path::Path;
use tracing::info;
use serde::{Deserialize, Serialize};
use anyhow::{Result, Context};

/// 认证核心配置
///
/// 所有超时/TTL 都是显式字段，在构造时注入各组件，
/// 不使用全局可变状态（避免测试之间互相干扰）。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// JWT 签名密钥（至少 32 字符）
    pub jwt_secret: String,
    /// Access token 有效期（秒）
    pub access_ttl_secs: i64,
    /// Refresh token 有效期（秒）
    pub refresh_ttl_secs: i64,
    /// Refresh token 有效期 - 记住我（秒）
    pub remember_me_refresh_ttl_secs: i64,
    /// 会话绝对有效期（秒）
    pub session_ttl_secs: i64,
    /// 会话绝对有效期 - 记住我（秒）
    pub remember_me_session_ttl_secs: i64,
    /// 空闲超时窗口（秒）
    pub idle_timeout_secs: i64,
    /// 空闲告警阈值（窗口占比，0.0 ~ 1.0）
    pub idle_warning_threshold: f64,
    /// 最大连续登录失败次数
    pub max_login_attempts: u32,
    /// 锁定时长（秒）
    pub lockout_duration_secs: i64,
    /// 实时连接握手认证超时（秒）
    pub handshake_timeout_secs: u64,
    /// 过期会话清理间隔（秒）
    pub cleanup_interval_secs: u64,
    /// Token 签发者
    pub issuer: String,
    /// Token 受众
    pub audience: String,
    /// 日志级别
    pub log_level: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "change-me-to-a-real-32-byte-secret!!".to_string(),
            access_ttl_secs: 15 * 60,
            refresh_ttl_secs: 7 * 24 * 3600,
            remember_me_refresh_ttl_secs: 30 * 24 * 3600,
            session_ttl_secs: 24 * 3600,
            remember_me_session_ttl_secs: 30 * 24 * 3600,
            idle_timeout_secs: 30 * 60,
            idle_warning_threshold: 0.8,
            max_login_attempts: 5,
            lockout_duration_secs: 15 * 60,
            handshake_timeout_secs: 10,
            cleanup_interval_secs: 60,
            issuer: "authsync".to_string(),
            audience: "authsync-web".to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl AuthConfig {
    /// 创建默认配置
    pub fn new() -> Self {
        Self::default()
    }

    /// 测试配置（短 TTL，便于验证过期路径）
    pub fn for_testing() -> Self {
        Self {
            jwt_secret: "test-secret-key-at-least-32-chars!!!".to_string(),
            access_ttl_secs: 60,
            refresh_ttl_secs: 3600,
            remember_me_refresh_ttl_secs: 7200,
            session_ttl_secs: 3600,
            remember_me_session_ttl_secs: 7200,
            idle_timeout_secs: 30 * 60,
            idle_warning_threshold: 0.8,
            max_login_attempts: 3,
            lockout_duration_secs: 2,
            handshake_timeout_secs: 2,
            cleanup_interval_secs: 1,
            ..Self::default()
        }
    }

    /// 从 TOML 文件加载配置
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("无法读取配置文件: {:?}", path.as_ref()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| "配置文件格式错误")?;

        Ok(toml_config.into())
    }

    /// 从环境变量合并配置（AUTHSYNC_ 前缀）
    pub fn merge_from_env(&mut self) {
        if let Ok(secret) = env::var("AUTHSYNC_JWT_SECRET") {
            self.jwt_secret = secret;
        }
        if let Ok(ttl) = env::var("AUTHSYNC_ACCESS_TTL_SECS") {
            self.access_ttl_secs = ttl.parse().unwrap_or(self.access_ttl_secs);
        }
        if let Ok(ttl) = env::var("AUTHSYNC_REFRESH_TTL_SECS") {
            self.refresh_ttl_secs = ttl.parse().unwrap_or(self.refresh_ttl_secs);
        }
        if let Ok(ttl) = env::var("AUTHSYNC_SESSION_TTL_SECS") {
            self.session_ttl_secs = ttl.parse().unwrap_or(self.session_ttl_secs);
        }
        if let Ok(secs) = env::var("AUTHSYNC_IDLE_TIMEOUT_SECS") {
            self.idle_timeout_secs = secs.parse().unwrap_or(self.idle_timeout_secs);
        }
        if let Ok(attempts) = env::var("AUTHSYNC_MAX_LOGIN_ATTEMPTS") {
            self.max_login_attempts = attempts.parse().unwrap_or(self.max_login_attempts);
        }
        if let Ok(level) = env::var("AUTHSYNC_LOG_LEVEL") {
            self.log_level = level;
        }
    }

    /// 加载配置（优先级：环境变量 > 配置文件 > 默认值）
    pub fn load(config_file: Option<&str>) -> Result<Self> {
        let mut config = if let Some(path) = config_file {
            if Path::new(path).exists() {
                info!("📄 从配置文件加载: {}", path);
                Self::from_toml_file(path)?
            } else {
                tracing::warn!("⚠️ 配置文件不存在: {}", path);
                Self::default()
            }
        } else if Path::new("authsync.toml").exists() {
            info!("📄 从默认配置文件加载: authsync.toml");
            Self::from_toml_file("authsync.toml")?
        } else {
            Self::default()
        };

        config.merge_from_env();
        config.validate()?;

        Ok(config)
    }

    /// 校验配置
    pub fn validate(&self) -> Result<()> {
        if self.jwt_secret.len() < 32 {
            anyhow::bail!("jwt_secret 长度不能小于 32 字符");
        }
        if self.access_ttl_secs <= 0 || self.refresh_ttl_secs <= 0 {
            anyhow::bail!("token TTL 必须大于 0");
        }
        if self.refresh_ttl_secs <= self.access_ttl_secs {
            anyhow::bail!("refresh TTL 必须大于 access TTL");
        }
        if !(0.0..=1.0).contains(&self.idle_warning_threshold) {
            anyhow::bail!("idle_warning_threshold 必须在 0.0 ~ 1.0 之间");
        }
        if self.max_login_attempts == 0 {
            anyhow::bail!("max_login_attempts 不能为 0");
        }
        Ok(())
    }

    /// 空闲告警阈值（秒）
    pub fn idle_warning_secs(&self) -> i64 {
        (self.idle_timeout_secs as f64 * self.idle_warning_threshold) as i64
    }
}

/// TOML 配置文件结构（用于反序列化，字段全部可选）
#[derive(Debug, Deserialize)]
struct TomlConfig {
    auth: Option<TomlAuthConfig>,
}

#[derive(Debug, Deserialize)]
struct TomlAuthConfig {
    jwt_secret: Option<String>,
    access_ttl_secs: Option<i64>,
    refresh_ttl_secs: Option<i64>,
    remember_me_refresh_ttl_secs: Option<i64>,
    session_ttl_secs: Option<i64>,
    remember_me_session_ttl_secs: Option<i64>,
    idle_timeout_secs: Option<i64>,
    idle_warning_threshold: Option<f64>,
    max_login_attempts: Option<u32>,
    lockout_duration_secs: Option<i64>,
    handshake_timeout_secs: Option<u64>,
    cleanup_interval_secs: Option<u64>,
    issuer: Option<String>,
    audience: Option<String>,
    log_level: Option<String>,
}

impl From<TomlConfig> for AuthConfig {
    fn from(toml: TomlConfig) -> Self {
        let mut config = AuthConfig::default();

        if let Some(auth) = toml.auth {
            if let Some(v) = auth.jwt_secret {
                config.jwt_secret = v;
            }
            if let Some(v) = auth.access_ttl_secs {
                config.access_ttl_secs = v;
            }
            if let Some(v) = auth.refresh_ttl_secs {
                config.refresh_ttl_secs = v;
            }
            if let Some(v) = auth.remember_me_refresh_ttl_secs {
                config.remember_me_refresh_ttl_secs = v;
            }
            if let Some(v) = auth.session_ttl_secs {
                config.session_ttl_secs = v;
            }
            if let Some(v) = auth.remember_me_session_ttl_secs {
                config.remember_me_session_ttl_secs = v;
            }
            if let Some(v) = auth.idle_timeout_secs {
                config.idle_timeout_secs = v;
            }
            if let Some(v) = auth.idle_warning_threshold {
                config.idle_warning_threshold = v;
            }
            if let Some(v) = auth.max_login_attempts {
                config.max_login_attempts = v;
            }
            if let Some(v) = auth.lockout_duration_secs {
                config.lockout_duration_secs = v;
            }
            if let Some(v) = auth.handshake_timeout_secs {
                config.handshake_timeout_secs = v;
            }
            if let Some(v) = auth.cleanup_interval_secs {
                config.cleanup_interval_secs = v;
            }
            if let Some(v) = auth.issuer {
                config.issuer = v;
            }
            if let Some(v) = auth.audience {
                config.audience = v;
            }
            if let Some(v) = auth.log_level {
                config.log_level = v;
            }
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AuthConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.access_ttl_secs, 900);
        assert_eq!(config.idle_warning_secs(), 1440); // 30min * 0.8
    }

    #[test]
    fn test_validate_rejects_short_secret() {
        let config = AuthConfig {
            jwt_secret: "short".to_string(),
            ..AuthConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_inverted_ttl() {
        let config = AuthConfig {
            access_ttl_secs: 3600,
            refresh_ttl_secs: 60,
            ..AuthConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_toml() {
        let toml_str = r#"
            [auth]
            access_ttl_secs = 300
            idle_timeout_secs = 600
            issuer = "my-app"
        "#;
        let toml_config: TomlConfig = toml::from_str(toml_str).unwrap();
        let config: AuthConfig = toml_config.into();

        assert_eq!(config.access_ttl_secs, 300);
        assert_eq!(config.idle_timeout_secs, 600);
        assert_eq!(config.issuer, "my-app");
        // 未指定的字段保持默认值
        assert_eq!(config.refresh_ttl_secs, 7 * 24 * 3600);
    }
}
