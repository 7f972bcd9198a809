use crate::model::{Device, DeviceSignals};
use serde::Serialize;

/// 风险权重（命名常量，阈值随评估结果一起单测锁定）
pub const WEIGHT_NEW_FINGERPRINT: u8 = 40;
pub const WEIGHT_NEW_IP: u8 = 25;
pub const WEIGHT_TIMEZONE_MISMATCH: u8 = 20;
pub const WEIGHT_UNVERIFIED_DEVICE: u8 = 15;

/// 风险分级阈值
const RISK_MEDIUM_THRESHOLD: u8 = 30;
const RISK_HIGH_THRESHOLD: u8 = 60;

/// 信任分级阈值
const TRUST_HIGH_THRESHOLD: u8 = 70;
const TRUST_MEDIUM_THRESHOLD: u8 = 40;

/// 信任级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustLevel {
    High,
    Medium,
    Low,
}

/// 风险级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// 设备安全评估结果
#[derive(Debug, Clone, Serialize)]
pub struct SecurityAssessment {
    pub trust_level: TrustLevel,
    pub risk_level: RiskLevel,
    /// 累计风险分（不匹配信号的权重和，封顶 100）
    pub risk_score: u8,
    /// 触发的风险因素（审计/提示用）
    pub factors: Vec<&'static str>,
}

impl SecurityAssessment {
    pub fn is_high_risk(&self) -> bool {
        self.risk_level == RiskLevel::High
    }
}

/// 评估一次登录的设备安全性
///
/// 纯函数：只比较设备历史与本次观察，不产生副作用。
/// 风险随不匹配信号数量单调递增。`device` 为 None 表示
/// 该指纹对此用户完全陌生。
pub fn assess_device_security(
    device: Option<&Device>,
    signals: &DeviceSignals,
    ip_address: &str,
) -> SecurityAssessment {
    let mut risk_score: u8 = 0;
    let mut factors = Vec::new();

    match device {
        None => {
            // 陌生指纹本身就是最重的信号
            risk_score = risk_score.saturating_add(WEIGHT_NEW_FINGERPRINT);
            factors.push("unrecognized_fingerprint");
            risk_score = risk_score.saturating_add(WEIGHT_NEW_IP);
            factors.push("unseen_ip_address");
            risk_score = risk_score.saturating_add(WEIGHT_UNVERIFIED_DEVICE);
            factors.push("unverified_device");
        }
        Some(device) => {
            if !device.has_seen_ip(ip_address) {
                risk_score = risk_score.saturating_add(WEIGHT_NEW_IP);
                factors.push("unseen_ip_address");
            }
            if device.timezone != signals.timezone {
                risk_score = risk_score.saturating_add(WEIGHT_TIMEZONE_MISMATCH);
                factors.push("timezone_mismatch");
            }
            if !device.is_verified {
                risk_score = risk_score.saturating_add(WEIGHT_UNVERIFIED_DEVICE);
                factors.push("unverified_device");
            }
        }
    }

    let risk_score = risk_score.min(100);

    let risk_level = if risk_score >= RISK_HIGH_THRESHOLD {
        RiskLevel::High
    } else if risk_score >= RISK_MEDIUM_THRESHOLD {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    };

    let trust_score = device.map(|d| d.trust_score).unwrap_or(0);
    let trust_level = if trust_score >= TRUST_HIGH_THRESHOLD {
        TrustLevel::High
    } else if trust_score >= TRUST_MEDIUM_THRESHOLD {
        TrustLevel::Medium
    } else {
        TrustLevel::Low
    };

    SecurityAssessment {
        trust_level,
        risk_level,
        risk_score,
        factors,
    }
}
