use crate::auth::password::{hash_password, verify_password};
use crate::config::AuthConfig;
use crate::error::{AuthError, Result};
use crate::model::{User, UserProfile, UserRole, UserSecurity, UserStatus};
use chrono::{Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// 注册用户参数
#[derive(Debug, Clone)]
pub struct RegisterUserParams {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub role: UserRole,
    pub timezone: Option<String>,
}

/// 用户目录（用户实体协作方）
///
/// 本核心只负责安全元数据（失败计数、锁定、改密时间、最后登录），
/// 其余用户生命周期由外部系统管理。
pub struct UserDirectory {
    /// 存储：user_id -> User
    users: DashMap<String, User>,

    /// 唯一索引：email -> user_id
    email_index: DashMap<String, String>,

    config: Arc<AuthConfig>,
}

impl UserDirectory {
    /// 创建新的用户目录
    pub fn new(config: Arc<AuthConfig>) -> Self {
        Self {
            users: DashMap::new(),
            email_index: DashMap::new(),
            config,
        }
    }

    /// 注册用户
    pub fn register_user(&self, params: RegisterUserParams) -> Result<User> {
        let email = params.email.to_lowercase();

        if email.is_empty() || !email.contains('@') {
            return Err(AuthError::Validation("邮箱格式无效".to_string()));
        }
        if params.password.len() < 8 {
            return Err(AuthError::Validation("密码长度不能小于 8".to_string()));
        }

        let user = User {
            id: Uuid::new_v4().to_string(),
            email: email.clone(),
            profile: UserProfile {
                first_name: params.first_name,
                last_name: params.last_name,
                phone_number: None,
                timezone: params.timezone,
            },
            role: params.role,
            status: UserStatus::default(),
            security: UserSecurity {
                password_hash: hash_password(&params.password)?,
                password_changed_at: None,
                email_verified: false,
                login_attempts: 0,
                locked_until: None,
                last_login: None,
            },
            created_at: Utc::now(),
        };

        // email 唯一索引：entry 占位成功才落用户行
        use dashmap::mapref::entry::Entry;
        match self.email_index.entry(email.clone()) {
            Entry::Occupied(_) => {
                return Err(AuthError::Validation(format!("邮箱已被注册: {}", email)));
            }
            Entry::Vacant(vacant) => {
                self.users.insert(user.id.clone(), user.clone());
                vacant.insert(user.id.clone());
            }
        }

        info!("✅ 用户注册: user={}, email={}", user.id, email);
        Ok(user)
    }

    /// 按邮箱查找用户
    pub fn find_by_email(&self, email: &str) -> Option<User> {
        let user_id = self.email_index.get(&email.to_lowercase())?.clone();
        self.find_by_id(&user_id)
    }

    /// 按ID查找用户
    pub fn find_by_id(&self, user_id: &str) -> Option<User> {
        self.users.get(user_id).map(|entry| entry.clone())
    }

    /// 校验密码
    pub fn check_password(&self, user: &User, password: &str) -> Result<bool> {
        verify_password(password, &user.security.password_hash)
    }

    /// 记录一次登录失败
    ///
    /// 达到上限时写入锁定截止时间。返回 (累计失败次数, 是否已锁定)。
    pub fn record_failed_login(&self, user_id: &str) -> (u32, bool) {
        let Some(mut user) = self.users.get_mut(user_id) else {
            return (0, false);
        };

        let attempts = user.record_failed_login();
        let locked = attempts >= self.config.max_login_attempts;

        if locked {
            user.security.locked_until =
                Some(Utc::now() + Duration::seconds(self.config.lockout_duration_secs));
            warn!(
                "⚠️ 账号锁定: user={}, attempts={}, duration={}s",
                user_id, attempts, self.config.lockout_duration_secs
            );
        }

        (attempts, locked)
    }

    /// 登录成功：清零失败计数、解除锁定、记录最后登录时间
    pub fn record_successful_login(&self, user_id: &str) {
        if let Some(mut user) = self.users.get_mut(user_id) {
            user.reset_login_attempts(Utc::now());
        }
    }

    /// 修改密码（调用方已验证旧密码）
    pub fn update_password(&self, user_id: &str, new_password: &str) -> Result<()> {
        if new_password.len() < 8 {
            return Err(AuthError::Validation("密码长度不能小于 8".to_string()));
        }

        let hash = hash_password(new_password)?;
        let mut user = self
            .users
            .get_mut(user_id)
            .ok_or_else(|| AuthError::UserNotFound(user_id.to_string()))?;

        user.security.password_hash = hash;
        user.security.password_changed_at = Some(Utc::now());

        info!("🔑 密码已修改: user={}", user_id);
        Ok(())
    }

    /// 删除用户（账号注销等外部流程调用）
    pub fn remove_user(&self, user_id: &str) -> Option<User> {
        let (_, user) = self.users.remove(user_id)?;
        self.email_index.remove(&user.email);
        info!("🧹 用户已删除: user={}", user_id);
        Some(user)
    }

    /// 用户总数
    pub fn user_count(&self) -> usize {
        self.users.len()
    }
}
