use crate::config::AuthConfig;
use crate::realtime::gateway::SyncGateway;
use crate::session::store::SessionStore;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// 会话清扫任务
///
/// 定期跑三个推送型转移，网关不轮询 —— 事件从这里产生：
/// 1. 空闲越过告警线的 Active 会话 → idle_warned + session:timeout_warning
/// 2. 空闲超限的会话 → expired + session:expired（随后断开房间）
/// 3. 过了绝对有效期的会话 → expired + session:expired（随后断开房间）
///
/// 每一步都建立在存储层的幂等转移上，重叠运行无副作用。
pub struct SessionSweeper {
    config: Arc<AuthConfig>,
    sessions: Arc<SessionStore>,
    gateway: Arc<SyncGateway>,
}

impl SessionSweeper {
    /// 创建清扫任务
    pub fn new(
        config: Arc<AuthConfig>,
        sessions: Arc<SessionStore>,
        gateway: Arc<SyncGateway>,
    ) -> Self {
        Self {
            config,
            sessions,
            gateway,
        }
    }

    /// 执行一轮清扫，返回 (告警数, 过期数)
    pub fn run_once(&self) -> (usize, usize) {
        let now = Utc::now();

        // 1. 空闲告警
        let mut warned = 0;
        for session in self.sessions.sessions_needing_idle_warning() {
            if self.sessions.mark_idle_warned(&session.id) {
                let expires_in = (session.expires_at - now).num_seconds().max(0);
                self.gateway.notify_timeout_warning(&session, expires_in);
                warned += 1;
            }
        }

        // 2. 空闲超时过期
        let mut expired = 0;
        for session in self.sessions.expire_idle_sessions() {
            self.gateway.notify_session_expired(&session);
            expired += 1;
        }

        // 3. 绝对超时过期
        for session in self.sessions.cleanup_expired_sessions() {
            self.gateway.notify_session_expired(&session);
            expired += 1;
        }

        if warned > 0 || expired > 0 {
            info!("🧹 清扫完成: warned={}, expired={}", warned, expired);
        }

        (warned, expired)
    }

    /// 启动周期清扫（调用方持有 JoinHandle，abort 即停止）
    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        let interval = Duration::from_secs(self.config.cleanup_interval_secs);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // 第一个 tick 立即返回，跳过它避免启动即清扫
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let (warned, expired) = self.run_once();
                debug!("清扫轮询: warned={}, expired={}", warned, expired);
            }
        })
    }
}
