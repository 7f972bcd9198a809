use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 用户角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Admin,
    TeamLead,
    Technical,
    Customer,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "admin",
            UserRole::TeamLead => "team_lead",
            UserRole::Technical => "technical",
            UserRole::Customer => "customer",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "admin" => Self::Admin,
            "team_lead" => Self::TeamLead,
            "technical" => Self::Technical,
            _ => Self::Customer,
        }
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 用户资料
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    /// IANA 时区（用于风险评估时对比登录时区）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

/// 用户状态
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserStatus {
    pub is_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified_at: Option<DateTime<Utc>>,
}

impl Default for UserStatus {
    fn default() -> Self {
        Self {
            is_active: true,
            verified_at: None,
        }
    }
}

/// 用户安全元数据
///
/// 本核心只读写这里的字段，用户实体的其余生命周期由外部负责。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSecurity {
    /// bcrypt 密码哈希
    pub password_hash: String,
    /// 密码最后修改时间
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password_changed_at: Option<DateTime<Utc>>,
    /// 邮箱是否已验证
    pub email_verified: bool,
    /// 连续登录失败次数
    pub login_attempts: u32,
    /// 锁定截止时间（超过后自动解锁）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locked_until: Option<DateTime<Utc>>,
    /// 最后成功登录时间
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_login: Option<DateTime<Utc>>,
}

/// 用户记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// 用户唯一ID (UUID)
    pub id: String,
    pub email: String,
    pub profile: UserProfile,
    pub role: UserRole,
    pub status: UserStatus,
    pub security: UserSecurity,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// 判断账号当前是否处于锁定期
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        match self.security.locked_until {
            Some(until) => until > now,
            None => false,
        }
    }

    /// 记录一次登录失败，返回累计失败次数
    pub fn record_failed_login(&mut self) -> u32 {
        self.security.login_attempts += 1;
        self.security.login_attempts
    }

    /// 登录成功后重置失败计数并解除锁定
    pub fn reset_login_attempts(&mut self, now: DateTime<Utc>) {
        self.security.login_attempts = 0;
        self.security.locked_until = None;
        self.security.last_login = Some(now);
    }

    /// 用户实时房间名
    pub fn user_room(&self) -> String {
        format!("user:{}", self.id)
    }
}
