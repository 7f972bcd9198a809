use crate::auth::cookies::{AuthCookies, CookieWriter};
use crate::auth::users::UserDirectory;
use crate::config::AuthConfig;
use crate::device::{assess_device_security, DeviceRegistry, SecurityAssessment};
use crate::error::{AuthError, Result};
use crate::model::{Device, Session, TerminationReason, User};
use crate::realtime::gateway::SyncGateway;
use crate::session::{CreateSessionParams, SessionStore};
use crate::token::{TokenClaims, TokenEngine, TokenPair};
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

/// 登录请求上下文（传输层解析后的纯数据）
#[derive(Debug, Clone)]
pub struct LoginContext {
    pub ip_address: String,
    pub user_agent: String,
    pub signals: crate::model::DeviceSignals,
    pub tab_id: Option<String>,
}

/// 登录结果
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub user: User,
    pub session: Session,
    pub device: Device,
    pub tokens: TokenPair,
    pub security: SecurityAssessment,
}

/// 已认证请求的上下文（token 验证 + 会话交叉检查之后）
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user: User,
    pub session: Session,
    pub claims: TokenClaims,
}

/// 认证编排器
///
/// 组合设备注册表、会话存储和 Token 引擎，把登录/登出/刷新
/// 实现为多步工作流。步骤失败时不留半套状态：
/// cookie 只在全部成功后写入，CSRF 校验在任何状态变更之前。
pub struct AuthOrchestrator {
    config: Arc<AuthConfig>,
    users: Arc<UserDirectory>,
    devices: Arc<DeviceRegistry>,
    sessions: Arc<SessionStore>,
    tokens: Arc<TokenEngine>,
    gateway: Arc<SyncGateway>,
}

impl AuthOrchestrator {
    /// 创建编排器
    pub fn new(
        config: Arc<AuthConfig>,
        users: Arc<UserDirectory>,
        devices: Arc<DeviceRegistry>,
        sessions: Arc<SessionStore>,
        tokens: Arc<TokenEngine>,
        gateway: Arc<SyncGateway>,
    ) -> Self {
        Self {
            config,
            users,
            devices,
            sessions,
            tokens,
            gateway,
        }
    }

    /// 登录
    ///
    /// 凭证校验 → 设备解析 → 会话创建 → token 三元组签发 → 写 cookie。
    /// 相同指纹的并发登录收敛到一个设备行（会话按登录各建一条）；
    /// 不同指纹各建设备行。
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        context: LoginContext,
        remember_me: bool,
        writer: &dyn CookieWriter,
    ) -> Result<LoginOutcome> {
        let now = Utc::now();

        // 1. 查找用户（不区分"用户不存在"和"密码错误"，避免枚举邮箱）
        let user = self
            .users
            .find_by_email(email)
            .ok_or(AuthError::InvalidCredentials)?;

        // 2. 锁定期内无论密码对错都拒绝
        if user.is_locked(now) {
            warn!("⚠️ 锁定期登录被拒: user={}", user.id);
            return Err(AuthError::AccountLocked(
                "账号已临时锁定，请稍后再试".to_string(),
            ));
        }

        // 3. 校验密码，失败累计计数，越过上限时升级为限流错误
        if !self.users.check_password(&user, password)? {
            let (attempts, locked) = self.users.record_failed_login(&user.id);
            if locked {
                return Err(AuthError::TooManyAttempts(format!(
                    "连续失败 {} 次，账号已锁定",
                    attempts
                )));
            }
            return Err(AuthError::InvalidCredentials);
        }

        // 4. 基于已有历史做安全评估（record 之前，评估才是对"这次观察"的）
        let consistency = self
            .devices
            .verify_device_consistency(&user.id, &context.signals);
        let known_device = consistency
            .device_id
            .as_deref()
            .and_then(|id| self.devices.get_device(id));
        let security =
            assess_device_security(known_device.as_ref(), &context.signals, &context.ip_address);

        // 5. find-or-create 设备行（并发安全，唯一键 (user, fingerprint)）
        let device = self
            .devices
            .record_device_info(&user.id, &context.signals, &context.ip_address);
        if security.is_high_risk() {
            self.devices.penalize_trust(&device.id);
        }

        // 6. 创建会话并签发 token 三元组
        let csrf_token = self.tokens.generate_csrf_token();
        let session = self.sessions.create_session(CreateSessionParams {
            user_id: user.id.clone(),
            device_id: device.id.clone(),
            fingerprint: device.fingerprint.clone(),
            ip_address: context.ip_address.clone(),
            user_agent: context.user_agent.clone(),
            csrf_token: csrf_token.clone(),
            refresh_jti: String::new(),
            remember_me,
            tab_id: context.tab_id.clone(),
        });

        let tokens = self.tokens.generate_token_pair(
            &user.id,
            &session.id,
            &device.id,
            user.role.as_str(),
            remember_me,
        )?;
        self.sessions.record_rotation(&session.id, &tokens.refresh_jti);

        // 7. 全部成功后才写 cookie
        writer.set_auth_cookies(&AuthCookies {
            access_token: tokens.access_token.clone(),
            refresh_token: tokens.refresh_token.clone(),
            csrf_token,
            access_max_age: tokens.access_expires_in,
            refresh_max_age: tokens.refresh_expires_in,
        });

        // 8. 清零失败计数
        self.users.record_successful_login(&user.id);

        info!(
            "✅ 登录成功: user={}, session={}, device={}, risk={:?}",
            user.id, session.id, device.id, security.risk_level
        );

        let session = self
            .sessions
            .get_session_by_id(&session.id)
            .unwrap_or(session);
        let user = self.users.find_by_id(&user.id).unwrap_or(user);

        Ok(LoginOutcome {
            user,
            session,
            device,
            tokens,
            security,
        })
    }

    /// 登出
    ///
    /// CSRF 校验在任何状态变更之前；会话已结束时仍清 cookie 并返回成功。
    pub async fn logout(
        &self,
        session_id: &str,
        csrf_header: &str,
        writer: &dyn CookieWriter,
    ) -> Result<()> {
        let Some(session) = self.sessions.get_session_by_id(session_id) else {
            // 会话行已不存在：没有可终止的状态，清 cookie 即可
            writer.clear_auth_cookies();
            return Ok(());
        };

        if csrf_header != session.csrf_token {
            return Err(AuthError::CsrfMismatch);
        }

        let was_usable = session.status.is_usable();

        // 吊销当前 refresh token，终止会话，再通知房间
        self.revoke_session_refresh(&session);
        self.sessions
            .end_session(session_id, TerminationReason::Logout);

        if was_usable {
            self.gateway
                .notify_session_terminated(&session, TerminationReason::Logout.as_str());
        }

        writer.clear_auth_cookies();

        info!("✅ 登出完成: session={}, user={}", session_id, session.user_id);
        Ok(())
    }

    /// 全设备登出
    ///
    /// 逐会话尽力而为：单行失败不影响其余行，返回实际终止数量。
    pub async fn logout_all_devices(&self, user_id: &str) -> Result<usize> {
        let ended = self.sessions.terminate_all_user_sessions(user_id);

        for session in &ended {
            self.revoke_session_refresh(session);
            self.gateway
                .notify_session_terminated(session, TerminationReason::LogoutAllDevices.as_str());
        }

        info!(
            "✅ 全设备登出: user={}, terminated={}",
            user_id,
            ended.len()
        );
        Ok(ended.len())
    }

    /// 修改密码
    ///
    /// 旧密码校验失败按凭证错误处理；成功后终止该用户全部会话
    /// 并把终止原因（password_changed）扇出到每个会话房间。
    pub async fn change_password(
        &self,
        user_id: &str,
        old_password: &str,
        new_password: &str,
    ) -> Result<usize> {
        let user = self
            .users
            .find_by_id(user_id)
            .ok_or_else(|| AuthError::UserNotFound(user_id.to_string()))?;

        if !self.users.check_password(&user, old_password)? {
            return Err(AuthError::InvalidCredentials);
        }

        self.users.update_password(user_id, new_password)?;

        let ended = self
            .sessions
            .terminate_all_with_reason(user_id, TerminationReason::PasswordChanged);

        for session in &ended {
            self.revoke_session_refresh(session);
            self.gateway
                .notify_session_terminated(session, TerminationReason::PasswordChanged.as_str());
        }

        Ok(ended.len())
    }

    /// 从 access token 解析用户
    ///
    /// token 结构有效但用户已被删除时返回 UserNotFound，
    /// 与 token 验证错误是不同的类型。
    pub fn get_user_from_token(&self, access_token: &str) -> Result<User> {
        let claims = self.tokens.verify_access_token(access_token)?;
        self.users
            .find_by_id(&claims.sub)
            .ok_or_else(|| AuthError::UserNotFound(claims.sub))
    }

    /// 认证一个请求（会话交叉检查）
    ///
    /// token 不会因会话终止而自失效，所以任何已认证操作都要先确认
    /// token 指向的会话仍然可用，否则返回 SessionExpired。
    pub fn authenticate(&self, access_token: &str) -> Result<AuthContext> {
        let claims = self.tokens.verify_access_token(access_token)?;

        let session = self
            .sessions
            .get_session_by_id(&claims.session_id)
            .ok_or_else(|| AuthError::SessionNotFound(claims.session_id.clone()))?;

        if !session.status.is_usable() {
            return Err(AuthError::SessionExpired(session.id.clone()));
        }

        let user = self
            .users
            .find_by_id(&claims.sub)
            .ok_or_else(|| AuthError::UserNotFound(claims.sub.clone()))?;

        Ok(AuthContext {
            user,
            session,
            claims,
        })
    }

    /// 刷新 token（HTTP 侧入口）
    ///
    /// 先确认会话仍可用再消费旧 token，轮换成功后更新会话
    /// 并重写 cookie。并发提交同一个旧 token 时只有一个成功。
    pub async fn refresh_tokens(
        &self,
        old_refresh_token: &str,
        writer: &dyn CookieWriter,
    ) -> Result<TokenPair> {
        // 1. 非消费性验证（签名/过期/黑名单）
        let claims = self.tokens.verify_refresh_token(old_refresh_token)?;

        // 2. 会话交叉检查：终止的会话不能续命
        let session = self
            .sessions
            .get_session_by_id(&claims.session_id)
            .ok_or_else(|| AuthError::SessionNotFound(claims.session_id.clone()))?;
        if !session.status.is_usable() {
            return Err(AuthError::SessionExpired(session.id.clone()));
        }

        // 3. 原子轮换（并发输家在这里拿到 TokenRevoked）
        let pair = self.tokens.rotate_refresh_token(old_refresh_token)?;
        self.sessions.record_rotation(&session.id, &pair.refresh_jti);

        writer.set_auth_cookies(&AuthCookies {
            access_token: pair.access_token.clone(),
            refresh_token: pair.refresh_token.clone(),
            csrf_token: session.csrf_token.clone(),
            access_max_age: pair.access_expires_in,
            refresh_max_age: pair.refresh_expires_in,
        });

        Ok(pair)
    }

    /// 把会话当前的 refresh jti 加入黑名单
    ///
    /// exp 取不到原 token 的精确值，用"现在 + refresh TTL"作上界，
    /// 保证黑名单条目活得不比 token 短。
    fn revoke_session_refresh(&self, session: &Session) {
        if session.refresh_jti.is_empty() {
            return;
        }
        let exp_upper_bound =
            Utc::now().timestamp() + self.config.remember_me_refresh_ttl_secs.max(self.config.refresh_ttl_secs);
        self.tokens.revoke_jti(&session.refresh_jti, exp_upper_bound);
    }
}
