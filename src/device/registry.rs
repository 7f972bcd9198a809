use crate::device::fingerprint::generate_enhanced_fingerprint;
use crate::error::{AuthError, Result};
use crate::model::{Device, DeviceSignals, DeviceType};
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, info};
use uuid::Uuid;

/// 新设备的初始信任分
pub const INITIAL_TRUST: u8 = 50;
/// 每次在已知设备上成功登录的信任加分
pub const TRUST_INCREMENT: u8 = 5;
/// 高风险登录的信任扣分
pub const TRUST_PENALTY: u8 = 15;
/// 单设备保留的历史 IP 上限（保留最近的）
pub const MAX_IP_HISTORY: usize = 10;

/// 设备一致性检查结果
#[derive(Debug, Clone)]
pub struct DeviceConsistency {
    /// 该指纹是否已被此用户使用过
    pub is_known: bool,
    /// 解析出的设备ID（已知设备为已存在的ID，未知为 None）
    pub device_id: Option<String>,
    /// 计算出的指纹
    pub fingerprint: String,
}

/// 设备注册表
///
/// (user_id, fingerprint) 上的唯一约束由指纹索引的 entry 锁保证：
/// 并发登录同一个从未见过的指纹时，只有一个调用创建设备行，
/// 其余调用在同一 entry 上等待后走"已存在"分支复用该行。
pub struct DeviceRegistry {
    /// 存储：device_id -> Device
    devices: DashMap<String, Device>,

    /// 唯一索引：(user_id, fingerprint) -> device_id
    fingerprint_index: DashMap<(String, String), String>,
}

impl DeviceRegistry {
    /// 创建新的设备注册表
    pub fn new() -> Self {
        Self {
            devices: DashMap::new(),
            fingerprint_index: DashMap::new(),
        }
    }

    /// 记录设备信息（find-or-create）
    ///
    /// 首次见到该 (user, fingerprint)：创建设备行并初始化信任分和 IP 历史。
    /// 已知设备：追加新 IP（去重）、刷新 last_active。
    pub fn record_device_info(
        &self,
        user_id: &str,
        signals: &DeviceSignals,
        ip_address: &str,
    ) -> Device {
        let fingerprint = generate_enhanced_fingerprint(signals);
        let key = (user_id.to_string(), fingerprint.clone());
        let now = Utc::now();

        loop {
            match self.fingerprint_index.entry(key.clone()) {
                Entry::Occupied(occupied) => {
                    let device_id = occupied.get().clone();
                    drop(occupied);

                    // 已知设备：更新历史（entry 锁已释放，设备行上用自己的分片锁）
                    let Some(mut device) = self.devices.get_mut(&device_id) else {
                        // 索引指向的行刚被账号清理删掉，摘掉脏索引后重建
                        self.fingerprint_index.remove_if(&key, |_, id| id == &device_id);
                        continue;
                    };

                    if !device.has_seen_ip(ip_address) {
                        device.ip_addresses.push(ip_address.to_string());
                        if device.ip_addresses.len() > MAX_IP_HISTORY {
                            device.ip_addresses.remove(0);
                        }
                    }
                    device.last_active = now;
                    device.trust_score = device.trust_score.saturating_add(TRUST_INCREMENT).min(100);

                    debug!(
                        "设备活跃更新: user={}, device={}, trust={}",
                        user_id, device_id, device.trust_score
                    );

                    return device.clone();
                }
                Entry::Vacant(vacant) => {
                    // 新设备：持有 entry 锁期间完成创建，
                    // 并发的同指纹登录会在这里排队然后走 Occupied 分支
                    let device = Device {
                        id: Uuid::new_v4().to_string(),
                        user_id: user_id.to_string(),
                        name: format!("{} on {}", signals.browser, signals.os),
                        fingerprint: fingerprint.clone(),
                        user_agent: signals.user_agent.clone(),
                        browser: signals.browser.clone(),
                        os: signals.os.clone(),
                        device_type: DeviceType::from_user_agent(&signals.user_agent),
                        timezone: signals.timezone.clone(),
                        is_verified: false,
                        verified_at: None,
                        last_active: now,
                        ip_addresses: vec![ip_address.to_string()],
                        trust_score: INITIAL_TRUST,
                        created_at: now,
                    };

                    self.devices.insert(device.id.clone(), device.clone());
                    vacant.insert(device.id.clone());

                    info!(
                        "✅ 新设备注册: user={}, device={}, name={}",
                        user_id, device.id, device.name
                    );

                    return device;
                }
            }
        }
    }

    /// 检查指纹对该用户是否已知
    pub fn verify_device_consistency(
        &self,
        user_id: &str,
        signals: &DeviceSignals,
    ) -> DeviceConsistency {
        let fingerprint = generate_enhanced_fingerprint(signals);
        let device_id = self
            .fingerprint_index
            .get(&(user_id.to_string(), fingerprint.clone()))
            .map(|entry| entry.clone());

        DeviceConsistency {
            is_known: device_id.is_some(),
            device_id,
            fingerprint,
        }
    }

    /// 根据设备ID获取设备
    pub fn get_device(&self, device_id: &str) -> Option<Device> {
        self.devices.get(device_id).map(|entry| entry.clone())
    }

    /// 获取用户的所有设备
    pub fn get_user_devices(&self, user_id: &str) -> Vec<Device> {
        self.devices
            .iter()
            .filter(|entry| entry.value().user_id == user_id)
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// 校验设备属于指定用户
    pub fn ensure_device_owner(&self, device_id: &str, user_id: &str) -> Result<Device> {
        let device = self
            .get_device(device_id)
            .ok_or_else(|| AuthError::DeviceNotFound(device_id.to_string()))?;

        if device.user_id != user_id {
            return Err(AuthError::DeviceMismatch(format!(
                "device {} does not belong to user {}",
                device_id, user_id
            )));
        }

        Ok(device)
    }

    /// 高风险登录扣减信任分
    pub fn penalize_trust(&self, device_id: &str) {
        if let Some(mut device) = self.devices.get_mut(device_id) {
            device.trust_score = device.trust_score.saturating_sub(TRUST_PENALTY);
            debug!(
                "⚠️ 设备信任扣分: device={}, trust={}",
                device_id, device.trust_score
            );
        }
    }

    /// 标记设备已验证
    pub fn mark_verified(&self, device_id: &str) -> Result<()> {
        let mut device = self
            .devices
            .get_mut(device_id)
            .ok_or_else(|| AuthError::DeviceNotFound(device_id.to_string()))?;

        device.is_verified = true;
        device.verified_at = Some(Utc::now());
        Ok(())
    }

    /// 删除用户的所有设备（账号清理）
    pub fn remove_all_user_devices(&self, user_id: &str) -> usize {
        let to_remove: Vec<Device> = self.get_user_devices(user_id);
        let count = to_remove.len();

        for device in &to_remove {
            // 先摘索引再删行，并发的 find-or-create 不会拿到指向空行的索引
            self.fingerprint_index
                .remove(&(user_id.to_string(), device.fingerprint.clone()));
            self.devices.remove(&device.id);
        }

        if count > 0 {
            info!("🧹 已删除用户 {} 的所有 {} 个设备", user_id, count);
        }
        count
    }

    /// 设备总数
    pub fn device_count(&self) -> usize {
        self.devices.len()
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
