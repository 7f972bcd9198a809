use crate::config::AuthConfig;
use crate::error::{AuthError, Result};
use crate::model::{Session, SessionMetadata, SessionStatus, TerminationReason};
use chrono::{Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// 创建会话参数
#[derive(Debug, Clone)]
pub struct CreateSessionParams {
    pub user_id: String,
    pub device_id: String,
    pub fingerprint: String,
    pub ip_address: String,
    pub user_agent: String,
    /// 会话绑定的 CSRF token
    pub csrf_token: String,
    /// 初始 refresh token 的 jti
    pub refresh_jti: String,
    /// 记住我（使用更长的绝对有效期）
    pub remember_me: bool,
    pub tab_id: Option<String>,
}

/// 活动事件附带的元数据（按需合并，不覆盖未提供的字段）
#[derive(Debug, Clone, Default)]
pub struct ActivityMetadata {
    pub tab_id: Option<String>,
    pub is_leader: Option<bool>,
}

/// 会话超时信息
#[derive(Debug, Clone)]
pub struct SessionTimeoutInfo {
    /// 已空闲秒数 (now - last_activity)
    pub idle_seconds: i64,
    /// 距绝对过期剩余秒数
    pub remaining_seconds: i64,
    /// 空闲时间是否已越过告警线
    pub is_approaching_idle_timeout: bool,
}

/// 会话存储
///
/// 一次登录一条会话。终态（expired/ended）不可逆：
/// 迟到的活动更新对终态行是 no-op，终止永远赢。
pub struct SessionStore {
    /// 存储：session_id -> Session
    sessions: DashMap<String, Session>,
    config: Arc<AuthConfig>,
}

impl SessionStore {
    /// 创建新的会话存储
    pub fn new(config: Arc<AuthConfig>) -> Self {
        Self {
            sessions: DashMap::new(),
            config,
        }
    }

    /// 创建会话（active，lastActivity=now，expiresAt=now+TTL）
    pub fn create_session(&self, params: CreateSessionParams) -> Session {
        let now = Utc::now();
        let ttl = if params.remember_me {
            self.config.remember_me_session_ttl_secs
        } else {
            self.config.session_ttl_secs
        };

        let session = Session {
            id: Uuid::new_v4().to_string(),
            user_id: params.user_id,
            device_id: params.device_id,
            fingerprint: params.fingerprint,
            ip_address: params.ip_address,
            user_agent: params.user_agent,
            status: SessionStatus::Active,
            last_activity: now,
            expires_at: now + Duration::seconds(ttl),
            csrf_token: params.csrf_token,
            refresh_jti: params.refresh_jti,
            metadata: SessionMetadata {
                tab_id: params.tab_id,
                is_leader: false,
                termination_reason: None,
            },
            created_at: now,
        };

        self.sessions.insert(session.id.clone(), session.clone());

        info!(
            "✅ 会话创建: session={}, user={}, device={}, expires_at={}",
            session.id, session.user_id, session.device_id, session.expires_at
        );

        session
    }

    /// 根据ID获取会话
    pub fn get_session_by_id(&self, session_id: &str) -> Option<Session> {
        self.sessions.get(session_id).map(|entry| entry.clone())
    }

    /// 获取用户的所有会话（不过滤状态）
    pub fn get_user_sessions(&self, user_id: &str) -> Vec<Session> {
        self.sessions
            .iter()
            .filter(|entry| entry.value().user_id == user_id)
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// 获取用户当前可用的会话
    pub fn get_usable_user_sessions(&self, user_id: &str) -> Vec<Session> {
        self.get_user_sessions(user_id)
            .into_iter()
            .filter(|s| s.status.is_usable())
            .collect()
    }

    /// 更新会话活动
    ///
    /// 心跳/用户活动/刷新都走这里。idle_warned 的会话收到活动后回到
    /// active（告警被用户活动取消）。终态行是 no-op，返回 false。
    pub fn update_session_activity(
        &self,
        session_id: &str,
        event_type: &str,
        metadata: Option<ActivityMetadata>,
    ) -> bool {
        let Some(mut session) = self.sessions.get_mut(session_id) else {
            return false;
        };

        if session.status.is_terminal() {
            debug!(
                "忽略终态会话的活动更新: session={}, status={}, event={}",
                session_id, session.status, event_type
            );
            return false;
        }

        session.last_activity = Utc::now();
        if session.status == SessionStatus::IdleWarned {
            session.status = SessionStatus::Active;
        }

        if let Some(meta) = metadata {
            if let Some(tab_id) = meta.tab_id {
                session.metadata.tab_id = Some(tab_id);
            }
            if let Some(is_leader) = meta.is_leader {
                session.metadata.is_leader = is_leader;
            }
        }

        true
    }

    /// 轮换后登记新的 refresh jti 并刷新活动时间
    pub fn record_rotation(&self, session_id: &str, refresh_jti: &str) -> bool {
        let Some(mut session) = self.sessions.get_mut(session_id) else {
            return false;
        };
        if session.status.is_terminal() {
            return false;
        }

        session.refresh_jti = refresh_jti.to_string();
        session.last_activity = Utc::now();
        if session.status == SessionStatus::IdleWarned {
            session.status = SessionStatus::Active;
        }
        true
    }

    /// 计算会话超时信息
    pub fn get_session_timeout_info(&self, session_id: &str) -> Result<SessionTimeoutInfo> {
        let session = self
            .get_session_by_id(session_id)
            .ok_or_else(|| AuthError::SessionNotFound(session_id.to_string()))?;

        let now = Utc::now();
        let idle_seconds = (now - session.last_activity).num_seconds().max(0);
        let remaining_seconds = (session.expires_at - now).num_seconds();

        Ok(SessionTimeoutInfo {
            idle_seconds,
            remaining_seconds,
            is_approaching_idle_timeout: idle_seconds >= self.config.idle_warning_secs(),
        })
    }

    /// 将 Active 会话标记为已发出空闲告警
    pub fn mark_idle_warned(&self, session_id: &str) -> bool {
        let Some(mut session) = self.sessions.get_mut(session_id) else {
            return false;
        };
        if session.status != SessionStatus::Active {
            return false;
        }
        session.status = SessionStatus::IdleWarned;
        true
    }

    /// 结束会话（幂等）
    ///
    /// 返回转移后的会话；对已是终态的行不做任何修改。
    pub fn end_session(&self, session_id: &str, reason: TerminationReason) -> Option<Session> {
        let mut session = self.sessions.get_mut(session_id)?;

        if session.status.is_terminal() {
            // 重复结束是 no-op，不是错误
            return Some(session.clone());
        }

        session.status = SessionStatus::Ended;
        session.metadata.termination_reason = Some(reason);

        info!(
            "🔚 会话结束: session={}, user={}, reason={}",
            session_id, session.user_id, reason
        );

        Some(session.clone())
    }

    /// 终止单个会话（语义同 end_session，供实时终止流程使用）
    pub fn terminate_session(&self, session_id: &str, reason: TerminationReason) -> Option<Session> {
        self.end_session(session_id, reason)
    }

    /// 结束用户除当前之外的所有可用会话，返回被结束的会话
    pub fn end_all_user_sessions_except_current(
        &self,
        user_id: &str,
        current_session_id: &str,
    ) -> Vec<Session> {
        let targets: Vec<String> = self
            .get_usable_user_sessions(user_id)
            .into_iter()
            .filter(|s| s.id != current_session_id)
            .map(|s| s.id)
            .collect();

        self.end_batch(&targets, TerminationReason::LogoutAllDevices)
    }

    /// 终止用户的所有会话，返回被终止的会话
    ///
    /// 逐行尽力而为：单行失败不影响其余行。
    pub fn terminate_all_user_sessions(&self, user_id: &str) -> Vec<Session> {
        let targets: Vec<String> = self
            .get_usable_user_sessions(user_id)
            .into_iter()
            .map(|s| s.id)
            .collect();

        let ended = self.end_batch(&targets, TerminationReason::LogoutAllDevices);

        info!(
            "✅ 已终止用户 {} 的 {} 个会话",
            user_id,
            ended.len()
        );
        ended
    }

    /// 按指定原因批量终止（改密等场景）
    pub fn terminate_all_with_reason(
        &self,
        user_id: &str,
        reason: TerminationReason,
    ) -> Vec<Session> {
        let targets: Vec<String> = self
            .get_usable_user_sessions(user_id)
            .into_iter()
            .map(|s| s.id)
            .collect();

        self.end_batch(&targets, reason)
    }

    /// 清理已过期会话
    ///
    /// 将 expiresAt 已过且仍可用的行转为 expired，返回本次转移的行。
    /// 可重复/并发调用：已是终态的行不会被二次转移或计数。
    pub fn cleanup_expired_sessions(&self) -> Vec<Session> {
        let now = Utc::now();
        let mut transitioned = Vec::new();

        for mut entry in self.sessions.iter_mut() {
            let session = entry.value_mut();
            if session.status.is_usable() && session.expires_at < now {
                session.status = SessionStatus::Expired;
                session.metadata.termination_reason = Some(TerminationReason::AbsoluteTimeout);
                transitioned.push(session.clone());
            }
        }

        if !transitioned.is_empty() {
            info!("🧹 会话清理完成: 清理了 {} 个过期会话", transitioned.len());
        }

        transitioned
    }

    /// 将空闲超限的会话转为 expired（原因 idle_timeout）
    ///
    /// 空闲超时与绝对超时是两条独立的过期路径，
    /// 审计时靠 termination_reason 区分。
    pub fn expire_idle_sessions(&self) -> Vec<Session> {
        let now = Utc::now();
        let idle_limit = self.config.idle_timeout_secs;
        let mut transitioned = Vec::new();

        for mut entry in self.sessions.iter_mut() {
            let session = entry.value_mut();
            if session.status.is_usable()
                && (now - session.last_activity).num_seconds() >= idle_limit
            {
                session.status = SessionStatus::Expired;
                session.metadata.termination_reason = Some(TerminationReason::IdleTimeout);
                transitioned.push(session.clone());
            }
        }

        if !transitioned.is_empty() {
            info!("🧹 空闲超时: {} 个会话已过期", transitioned.len());
        }

        transitioned
    }

    /// 找出需要发出空闲告警的会话（Active 且空闲越过告警线）
    pub fn sessions_needing_idle_warning(&self) -> Vec<Session> {
        let now = Utc::now();
        let warning_secs = self.config.idle_warning_secs();

        self.sessions
            .iter()
            .filter(|entry| {
                let s = entry.value();
                s.status == SessionStatus::Active
                    && (now - s.last_activity).num_seconds() >= warning_secs
            })
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// 会话总数（含终态行）
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    fn end_batch(&self, session_ids: &[String], reason: TerminationReason) -> Vec<Session> {
        let mut ended = Vec::new();
        for session_id in session_ids {
            if let Some(mut session) = self.sessions.get_mut(session_id) {
                if session.status.is_terminal() {
                    continue;
                }
                session.status = SessionStatus::Ended;
                session.metadata.termination_reason = Some(reason);
                ended.push(session.clone());
            }
        }
        ended
    }

    #[cfg(test)]
    pub(crate) fn backdate_activity(&self, session_id: &str, seconds: i64) {
        if let Some(mut session) = self.sessions.get_mut(session_id) {
            session.last_activity = Utc::now() - Duration::seconds(seconds);
        }
    }

    #[cfg(test)]
    pub(crate) fn backdate_expiry(&self, session_id: &str, seconds: i64) {
        if let Some(mut session) = self.sessions.get_mut(session_id) {
            session.expires_at = Utc::now() - Duration::seconds(seconds);
        }
    }
}
