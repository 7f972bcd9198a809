use crate::model::DeviceSignals;
use uuid::Uuid;

/// 指纹命名空间（固定值，保证跨进程/跨重启确定性）
const FINGERPRINT_NAMESPACE: Uuid = Uuid::NAMESPACE_OID;

/// 计算增强设备指纹
///
/// UUIDv5（命名空间 SHA-1）作用在稳定信号的拼接串上：
/// 相同输入永远得到相同输出，任一信号变化输出就变化。
/// IP、时间戳、随机数等易变信号不参与 —— 设备识别要求跨会话稳定。
pub fn generate_enhanced_fingerprint(signals: &DeviceSignals) -> String {
    let material = [
        signals.browser.as_str(),
        signals.os.as_str(),
        signals.platform.as_str(),
        signals.screen_resolution.as_str(),
        signals.timezone.as_str(),
        signals.language.as_str(),
        signals.user_agent.as_str(),
    ]
    .join("|");

    Uuid::new_v5(&FINGERPRINT_NAMESPACE, material.as_bytes())
        .simple()
        .to_string()
}
