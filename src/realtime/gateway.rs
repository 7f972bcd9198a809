use crate::config::AuthConfig;
use crate::device::DeviceRegistry;
use crate::error::{AuthError, Result};
use crate::model::Session;
use crate::realtime::events::{
    ActivityPayload, HeartbeatPayload, ServerEvent, TokenRefreshPayload,
};
use crate::realtime::leader::{EarliestTabWins, LeaderClaim, LeaderElectionPolicy};
use crate::realtime::rooms::RoomRegistry;
use crate::session::{ActivityMetadata, SessionStore};
use crate::token::{TokenEngine, TokenPair};
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// 实时连接握手请求
///
/// token 可以来自 cookie 或握手载荷，传输层解析后以纯数据传入。
#[derive(Debug, Clone)]
pub struct HandshakeRequest {
    pub access_token: Option<String>,
    /// 可选的 CSRF token，提供时必须与会话绑定值一致
    pub csrf_token: Option<String>,
    /// 客户端声明的设备ID
    pub device_id: String,
    /// 标签页ID（一个连接 = 一个标签页）
    pub tab_id: String,
}

/// 握手成功结果
#[derive(Debug, Clone)]
pub struct HandshakeOutcome {
    pub user_id: String,
    pub session_id: String,
    pub device_id: String,
    pub tab_id: String,
    /// 已加入的房间
    pub rooms: Vec<String>,
}

/// 已认证连接的状态（派生数据，断开即丢弃）
#[derive(Debug, Clone)]
struct ConnectionState {
    user_id: String,
    session_id: String,
    device_id: String,
    user_room: String,
    device_room: String,
    session_room: String,
}

/// 实时同步网关
///
/// 用 Token 引擎认证连接，把连接放进 user/device/session/tab 四级房间，
/// 并把生命周期事件（刷新、告警、终止）扇出到相关房间，
/// 让所有打开的标签页/设备收敛到同一视图。
pub struct SyncGateway {
    config: Arc<AuthConfig>,
    tokens: Arc<TokenEngine>,
    sessions: Arc<SessionStore>,
    devices: Arc<DeviceRegistry>,
    rooms: Arc<RoomRegistry>,
    leader_policy: Box<dyn LeaderElectionPolicy>,

    /// 各设备房间的现任 leader
    leaders: DashMap<String, LeaderClaim>,

    /// 连接状态：connection_id -> ConnectionState
    states: DashMap<String, ConnectionState>,
}

impl SyncGateway {
    /// 创建网关（默认 EarliestTabWins 选举策略）
    pub fn new(
        config: Arc<AuthConfig>,
        tokens: Arc<TokenEngine>,
        sessions: Arc<SessionStore>,
        devices: Arc<DeviceRegistry>,
        rooms: Arc<RoomRegistry>,
    ) -> Self {
        Self::with_leader_policy(config, tokens, sessions, devices, rooms, Box::new(EarliestTabWins))
    }

    /// 指定选举策略创建网关
    pub fn with_leader_policy(
        config: Arc<AuthConfig>,
        tokens: Arc<TokenEngine>,
        sessions: Arc<SessionStore>,
        devices: Arc<DeviceRegistry>,
        rooms: Arc<RoomRegistry>,
        leader_policy: Box<dyn LeaderElectionPolicy>,
    ) -> Self {
        Self {
            config,
            tokens,
            sessions,
            devices,
            rooms,
            leader_policy,
            leaders: DashMap::new(),
            states: DashMap::new(),
        }
    }

    /// 房间注册表句柄（传输层注册连接用）
    pub fn rooms(&self) -> Arc<RoomRegistry> {
        self.rooms.clone()
    }

    /// 认证实时连接并加入房间
    ///
    /// 认证失败不产生任何房间成员关系（不存在部分加入），
    /// 错误以 auth:error 发给当前连接后断开。整个握手有超时上限。
    pub async fn authenticate_connection(
        &self,
        connection_id: &str,
        request: HandshakeRequest,
    ) -> Result<HandshakeOutcome> {
        let timeout = Duration::from_secs(self.config.handshake_timeout_secs);

        let result = match tokio::time::timeout(timeout, self.do_handshake(connection_id, &request)).await {
            Ok(result) => result,
            Err(elapsed) => Err(AuthError::from(elapsed)),
        };

        match result {
            Ok(outcome) => {
                // 只给当前连接回执，不广播
                self.rooms.emit_to_connection(
                    connection_id,
                    ServerEvent::AuthSuccess {
                        user_id: outcome.user_id.clone(),
                        session_id: outcome.session_id.clone(),
                    }
                    .envelope(),
                );

                info!(
                    "✅ 连接认证成功: conn={}, user={}, session={}, tab={}",
                    connection_id, outcome.user_id, outcome.session_id, outcome.tab_id
                );

                Ok(outcome)
            }
            Err(err) => {
                warn!("❌ 连接认证失败: conn={}, error={}", connection_id, err);

                self.rooms.emit_to_connection(
                    connection_id,
                    ServerEvent::AuthError {
                        message: err.to_string(),
                    }
                    .envelope(),
                );
                self.rooms.disconnect(connection_id);
                self.states.remove(connection_id);

                Err(err)
            }
        }
    }

    async fn do_handshake(
        &self,
        connection_id: &str,
        request: &HandshakeRequest,
    ) -> Result<HandshakeOutcome> {
        // 1. 必须携带 token
        let token = request
            .access_token
            .as_deref()
            .ok_or_else(|| AuthError::Unauthorized("missing access token".to_string()))?;

        // 2. 验证 token（过期/无效/撤销错误按类型透出）
        let claims = self.tokens.verify_access_token(token)?;

        // 3. 会话必须仍然可用（token 不会因会话终止而自失效，这里交叉检查）
        let session = self
            .sessions
            .get_session_by_id(&claims.session_id)
            .ok_or_else(|| AuthError::SessionNotFound(claims.session_id.clone()))?;

        if !session.status.is_usable() {
            return Err(AuthError::SessionExpired(session.id.clone()));
        }

        // 4. CSRF（提供了就必须匹配）
        if let Some(csrf) = request.csrf_token.as_deref() {
            if csrf != session.csrf_token {
                return Err(AuthError::CsrfMismatch);
            }
        }

        // 5. 声明的设备必须属于认证用户，且与 token 绑定的设备一致
        let device = self.devices.ensure_device_owner(&request.device_id, &claims.sub)?;
        if claims.device_id != request.device_id {
            return Err(AuthError::DeviceMismatch(format!(
                "token is bound to device {}, connection claims {}",
                claims.device_id, request.device_id
            )));
        }

        // 6. 全部通过后才加入房间
        let rooms = vec![
            session.user_room(),
            device.device_room(),
            session.session_room(),
            format!("tab:{}", request.tab_id),
        ];

        for room in &rooms {
            self.rooms.join(connection_id, room);
        }

        let state = ConnectionState {
            user_id: claims.sub.clone(),
            session_id: session.id.clone(),
            device_id: device.id.clone(),
            user_room: session.user_room(),
            device_room: device.device_room(),
            session_room: session.session_room(),
        };
        self.states.insert(connection_id.to_string(), state);

        Ok(HandshakeOutcome {
            user_id: claims.sub,
            session_id: session.id,
            device_id: device.id,
            tab_id: request.tab_id.clone(),
            rooms,
        })
    }

    /// 处理心跳
    ///
    /// 刷新会话活动时间，回 heartbeat:response，
    /// 并向用户房间广播 device:connected 让其他设备感知在线。
    pub fn handle_heartbeat(&self, connection_id: &str, payload: HeartbeatPayload) -> Result<()> {
        let state = self.state_of(connection_id)?;

        // 活动更新是 fire-and-forget：终态会话的 no-op 不报错
        self.sessions.update_session_activity(
            &state.session_id,
            "heartbeat",
            Some(ActivityMetadata {
                tab_id: Some(payload.tab_id),
                is_leader: Some(payload.is_leader),
            }),
        );

        self.rooms.emit_to_connection(
            connection_id,
            ServerEvent::HeartbeatResponse {
                timestamp: Utc::now().timestamp_millis(),
            }
            .envelope(),
        );

        // 设备间感知是尽力而为的广播
        self.rooms.emit_to_room(
            &state.user_room,
            ServerEvent::DeviceConnected {
                device_id: state.device_id.clone(),
                timestamp: Utc::now().timestamp_millis(),
            }
            .envelope(),
        );

        debug!(
            "💓 心跳: conn={}, user={}, session={}",
            connection_id, state.user_id, state.session_id
        );

        Ok(())
    }

    /// 处理用户活动（空闲超时计算的依据）
    pub fn handle_user_activity(&self, connection_id: &str, payload: ActivityPayload) -> Result<()> {
        let state = self.state_of(connection_id)?;

        self.sessions.update_session_activity(
            &state.session_id,
            "user:activity",
            Some(ActivityMetadata {
                tab_id: Some(payload.tab_id),
                is_leader: None,
            }),
        );

        Ok(())
    }

    /// 处理 token 刷新请求
    ///
    /// 轮换成功后先把 token:refreshed（只含过期信息）广播进会话房间，
    /// 再返回新 token 对 —— 发起标签页看到"刷新成功"时，
    /// 同会话的其他标签页一定已经收到了事件。
    /// 失败只通知发起连接。
    pub fn handle_token_refresh(
        &self,
        connection_id: &str,
        refresh_token: &str,
        payload: TokenRefreshPayload,
    ) -> Result<TokenPair> {
        let state = self.state_of(connection_id)?;

        // 会话交叉检查：刚被终止但还没断开的连接不能轮换续命
        let usable = self
            .sessions
            .get_session_by_id(&state.session_id)
            .map(|s| s.status.is_usable())
            .unwrap_or(false);
        if !usable {
            let err = AuthError::SessionExpired(state.session_id.clone());
            self.rooms.emit_to_connection(
                connection_id,
                ServerEvent::TokenRefreshError {
                    message: err.to_string(),
                }
                .envelope(),
            );
            return Err(err);
        }

        match self.tokens.rotate_refresh_token(refresh_token) {
            Ok(pair) => {
                self.sessions.record_rotation(&state.session_id, &pair.refresh_jti);
                self.sessions.update_session_activity(
                    &state.session_id,
                    "token:refresh",
                    Some(ActivityMetadata {
                        tab_id: Some(payload.tab_id),
                        is_leader: Some(payload.is_leader),
                    }),
                );

                let delivered = self.rooms.emit_to_room(
                    &state.session_room,
                    ServerEvent::TokenRefreshed {
                        expires_in: pair.access_expires_in,
                    }
                    .envelope(),
                );

                debug!(
                    "✅ token:refreshed 已广播: session={}, delivered={}",
                    state.session_id, delivered
                );

                Ok(pair)
            }
            Err(err) => {
                self.rooms.emit_to_connection(
                    connection_id,
                    ServerEvent::TokenRefreshError {
                        message: err.to_string(),
                    }
                    .envelope(),
                );
                Err(err)
            }
        }
    }

    /// 处理 leader 声明
    ///
    /// 网关不决定谁当 leader，只按策略裁决声明并把当选者
    /// 广播给设备房间的所有标签页，保证大家最终一致。
    pub fn handle_leader_claim(&self, connection_id: &str, claim: LeaderClaim) -> Result<()> {
        let state = self.state_of(connection_id)?;

        let winner = match self.leaders.entry(state.device_room.clone()) {
            Entry::Occupied(mut occupied) => {
                if self.leader_policy.challenge(Some(occupied.get()), &claim) {
                    occupied.insert(claim.clone());
                    claim
                } else {
                    occupied.get().clone()
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(claim.clone());
                claim
            }
        };

        debug!(
            "👑 leader 裁决: device_room={}, policy={}, winner={}",
            state.device_room,
            self.leader_policy.name(),
            winner.tab_id
        );

        self.rooms.emit_to_room(
            &state.device_room,
            ServerEvent::LeaderElected {
                tab_id: winner.tab_id,
            }
            .envelope(),
        );

        Ok(())
    }

    /// 推送空闲超时告警（由清扫任务调用）
    pub fn notify_timeout_warning(&self, session: &Session, expires_in: i64) {
        self.rooms.emit_to_room(
            &session.session_room(),
            ServerEvent::SessionTimeoutWarning {
                session_id: session.id.clone(),
                expires_in,
                message: "会话即将因空闲超时".to_string(),
            }
            .envelope(),
        );
    }

    /// 推送会话过期并断开房间内所有连接
    pub fn notify_session_expired(&self, session: &Session) {
        let room = session.session_room();
        let reason = session
            .metadata
            .termination_reason
            .map(|r| r.as_str())
            .unwrap_or("absolute_timeout");

        // 先投递终止事件，再断开：客户端在 socket 关闭前能读到原因
        self.rooms.emit_to_room(
            &room,
            ServerEvent::SessionExpired {
                session_id: session.id.clone(),
                reason: reason.to_string(),
                message: "会话已过期，请重新登录".to_string(),
            }
            .envelope(),
        );
        self.rooms.disconnect_room(&room);
        self.forget_session_connections(&session.id);
    }

    /// 推送会话终止并断开房间内所有连接
    pub fn notify_session_terminated(&self, session: &Session, reason: &str) {
        let room = session.session_room();

        self.rooms.emit_to_room(
            &room,
            ServerEvent::SessionTerminated {
                session_id: session.id.clone(),
                reason: reason.to_string(),
                message: "会话已被终止".to_string(),
            }
            .envelope(),
        );
        self.rooms.disconnect_room(&room);
        self.forget_session_connections(&session.id);
    }

    /// 传输层连接断开时的清理
    pub fn on_disconnect(&self, connection_id: &str) {
        self.states.remove(connection_id);
        self.rooms.disconnect(connection_id);
    }

    fn state_of(&self, connection_id: &str) -> Result<ConnectionState> {
        self.states
            .get(connection_id)
            .map(|entry| entry.clone())
            .ok_or_else(|| AuthError::Unauthorized("connection is not authenticated".to_string()))
    }

    fn forget_session_connections(&self, session_id: &str) {
        self.states.retain(|_, state| state.session_id != session_id);
    }
}
