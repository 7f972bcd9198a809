use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 会话状态（显式状态机）
///
/// active --(空闲越过告警线)--> idle_warned --(到期无活动)--> expired
/// active|idle_warned --(显式登出/终止)--> ended
///
/// expired 和 ended 都是终态，授权上等价（都拒绝请求），
/// 分开只是为了审计时区分原因。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// 活跃状态（正常使用）
    Active,
    /// 已发出空闲告警（仍可用，活动会回到 Active）
    IdleWarned,
    /// 已过期（超时清扫转入）
    Expired,
    /// 已结束（显式登出/强制终止）
    Ended,
}

impl SessionStatus {
    /// 判断状态是否可用（允许授权请求）
    pub fn is_usable(&self) -> bool {
        matches!(self, SessionStatus::Active | SessionStatus::IdleWarned)
    }

    /// 判断是否终态（终态不可逆，活动更新是 no-op）
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Expired | SessionStatus::Ended)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::IdleWarned => "idle_warned",
            SessionStatus::Expired => "expired",
            SessionStatus::Ended => "ended",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 会话终止原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// 用户主动登出
    Logout,
    /// 全设备登出
    LogoutAllDevices,
    /// 空闲超时
    IdleTimeout,
    /// 绝对超时
    AbsoluteTimeout,
    /// 密码修改
    PasswordChanged,
    /// 管理员操作
    AdminAction,
    /// 风控触发
    SecurityTrigger,
}

impl TerminationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminationReason::Logout => "logout",
            TerminationReason::LogoutAllDevices => "logout_all_devices",
            TerminationReason::IdleTimeout => "idle_timeout",
            TerminationReason::AbsoluteTimeout => "absolute_timeout",
            TerminationReason::PasswordChanged => "password_changed",
            TerminationReason::AdminAction => "admin_action",
            TerminationReason::SecurityTrigger => "security_trigger",
        }
    }
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 会话元数据（标签页协调信息等，按需合并更新）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionMetadata {
    /// 当前标签页ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tab_id: Option<String>,
    /// 该标签页是否是 leader
    #[serde(default)]
    pub is_leader: bool,
    /// 终止原因（进入终态时写入）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub termination_reason: Option<TerminationReason>,
}

/// 会话记录
///
/// 一次登录一条会话，不是一个标签页一条。
/// 多个会话可以指向同一个设备。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// 会话唯一ID (UUID)
    pub id: String,
    /// 所属用户ID
    pub user_id: String,
    /// 关联设备ID
    pub device_id: String,
    /// 设备指纹（用于推导设备房间名）
    pub fingerprint: String,
    /// 登录 IP
    pub ip_address: String,
    /// 登录 User-Agent
    pub user_agent: String,
    /// 会话状态
    pub status: SessionStatus,
    /// 最后活动时间
    pub last_activity: DateTime<Utc>,
    /// 绝对过期时间
    pub expires_at: DateTime<Utc>,
    /// 会话绑定的 CSRF token（不透明随机串）
    pub csrf_token: String,
    /// 当前 refresh token 的 jti（轮换时更新，登出时吊销）
    pub refresh_jti: String,
    /// 元数据
    #[serde(default)]
    pub metadata: SessionMetadata,
    /// 创建时间
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// 用户实时房间名
    pub fn user_room(&self) -> String {
        format!("user:{}", self.user_id)
    }

    /// 设备实时房间名
    pub fn device_room(&self) -> String {
        format!("device:{}", self.fingerprint)
    }

    /// 会话实时房间名
    pub fn session_room(&self) -> String {
        format!("session:{}", self.id)
    }
}
