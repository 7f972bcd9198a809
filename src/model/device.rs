use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 客户端上报的设备信号
///
/// 指纹只依赖其中的稳定信号，易变信号（IP、时间戳）不参与指纹计算。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSignals {
    /// 浏览器 (如 "Chrome 120")
    pub browser: String,
    /// 操作系统 (如 "Windows 11")
    pub os: String,
    /// 平台 (如 "Win32")
    pub platform: String,
    /// 屏幕分辨率 (如 "1920x1080")
    pub screen_resolution: String,
    /// IANA 时区 (如 "Asia/Shanghai")
    pub timezone: String,
    /// 语言 (如 "zh-CN")
    pub language: String,
    /// 原始 User-Agent
    pub user_agent: String,
}

/// 设备类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Mobile,
    Tablet,
    Desktop,
    Unknown,
}

impl DeviceType {
    /// 从 User-Agent 粗分类设备类型
    pub fn from_user_agent(user_agent: &str) -> Self {
        let ua = user_agent.to_lowercase();
        if ua.contains("ipad") || ua.contains("tablet") {
            Self::Tablet
        } else if ua.contains("mobile") || ua.contains("iphone") || ua.contains("android") {
            Self::Mobile
        } else if ua.contains("windows") || ua.contains("macintosh") || ua.contains("linux") {
            Self::Desktop
        } else {
            Self::Unknown
        }
    }
}

/// 设备记录
///
/// 每个用户的每个指纹至多一条记录，并发登录收敛到同一行。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    /// 设备唯一ID (UUID)
    pub id: String,
    /// 所属用户ID
    pub user_id: String,
    /// 设备名称（派生自浏览器+系统，用户可读）
    pub name: String,
    /// 设备指纹（稳定信号的确定性哈希）
    pub fingerprint: String,
    /// 原始 User-Agent
    pub user_agent: String,
    /// 浏览器
    pub browser: String,
    /// 操作系统
    pub os: String,
    /// 设备类型
    pub device_type: DeviceType,
    /// 登录时区（来自设备信号，用于风险比对）
    pub timezone: String,
    /// 是否已验证
    pub is_verified: bool,
    /// 验证时间
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified_at: Option<DateTime<Utc>>,
    /// 最后活跃时间
    pub last_active: DateTime<Utc>,
    /// 历史 IP 列表（最近的在末尾）
    pub ip_addresses: Vec<String>,
    /// 信任分 (0-100)
    pub trust_score: u8,
    /// 创建时间（首次登录）
    pub created_at: DateTime<Utc>,
}

impl Device {
    /// 用户实时房间名
    pub fn user_room(&self) -> String {
        format!("user:{}", self.user_id)
    }

    /// 设备实时房间名（按指纹，跨会话稳定）
    pub fn device_room(&self) -> String {
        format!("device:{}", self.fingerprint)
    }

    /// 判断 IP 是否在历史记录中
    pub fn has_seen_ip(&self, ip: &str) -> bool {
        self.ip_addresses.iter().any(|seen| seen == ip)
    }
}
