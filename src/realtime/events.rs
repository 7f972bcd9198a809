use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// 投递给连接的事件信封
#[derive(Debug, Clone, Serialize)]
pub struct EventEnvelope {
    pub event: String,
    pub payload: Value,
}

impl EventEnvelope {
    pub fn new(event: &str, payload: Value) -> Self {
        Self {
            event: event.to_string(),
            payload,
        }
    }
}

/// 服务端下行事件目录
///
/// 只携带状态描述，绝不携带原始 token 值 ——
/// token 本体走 cookie/响应通道，房间广播只发过期信息。
#[derive(Debug, Clone)]
pub enum ServerEvent {
    AuthSuccess { user_id: String, session_id: String },
    AuthError { message: String },
    TokenRefreshed { expires_in: i64 },
    TokenRefreshError { message: String },
    LeaderElected { tab_id: String },
    DeviceConnected { device_id: String, timestamp: i64 },
    SessionTimeoutWarning { session_id: String, expires_in: i64, message: String },
    SessionExpired { session_id: String, reason: String, message: String },
    SessionTerminated { session_id: String, reason: String, message: String },
    HeartbeatResponse { timestamp: i64 },
}

impl ServerEvent {
    /// 事件名（客户端按名订阅）
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::AuthSuccess { .. } => "auth:success",
            ServerEvent::AuthError { .. } => "auth:error",
            ServerEvent::TokenRefreshed { .. } => "token:refreshed",
            ServerEvent::TokenRefreshError { .. } => "token:refresh_error",
            ServerEvent::LeaderElected { .. } => "leader:elected",
            ServerEvent::DeviceConnected { .. } => "device:connected",
            ServerEvent::SessionTimeoutWarning { .. } => "session:timeout_warning",
            ServerEvent::SessionExpired { .. } => "session:expired",
            ServerEvent::SessionTerminated { .. } => "session:terminated",
            ServerEvent::HeartbeatResponse { .. } => "heartbeat:response",
        }
    }

    /// 构造 JSON 载荷
    pub fn payload(&self) -> Value {
        match self {
            ServerEvent::AuthSuccess { user_id, session_id } => json!({
                "userId": user_id,
                "sessionId": session_id,
            }),
            ServerEvent::AuthError { message } => json!({ "message": message }),
            ServerEvent::TokenRefreshed { expires_in } => json!({ "expiresIn": expires_in }),
            ServerEvent::TokenRefreshError { message } => json!({ "message": message }),
            ServerEvent::LeaderElected { tab_id } => json!({ "tabId": tab_id }),
            ServerEvent::DeviceConnected { device_id, timestamp } => json!({
                "deviceId": device_id,
                "timestamp": timestamp,
            }),
            ServerEvent::SessionTimeoutWarning { session_id, expires_in, message } => json!({
                "sessionId": session_id,
                "expiresIn": expires_in,
                "message": message,
            }),
            ServerEvent::SessionExpired { session_id, reason, message } => json!({
                "sessionId": session_id,
                "reason": reason,
                "message": message,
            }),
            ServerEvent::SessionTerminated { session_id, reason, message } => json!({
                "sessionId": session_id,
                "reason": reason,
                "message": message,
            }),
            ServerEvent::HeartbeatResponse { timestamp } => json!({ "timestamp": timestamp }),
        }
    }

    /// 打包成事件信封
    pub fn envelope(&self) -> EventEnvelope {
        EventEnvelope::new(self.name(), self.payload())
    }
}

/// 客户端心跳载荷
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatPayload {
    pub tab_id: String,
    pub timestamp: i64,
    #[serde(default)]
    pub is_leader: bool,
}

/// 客户端活动载荷
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityPayload {
    pub tab_id: String,
    pub timestamp: i64,
}

/// 客户端刷新请求载荷
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRefreshPayload {
    pub tab_id: String,
    pub timestamp: i64,
    #[serde(default)]
    pub is_leader: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names_match_catalog() {
        let event = ServerEvent::TokenRefreshed { expires_in: 900 };
        assert_eq!(event.name(), "token:refreshed");

        let event = ServerEvent::SessionTerminated {
            session_id: "s-1".to_string(),
            reason: "logout".to_string(),
            message: "done".to_string(),
        };
        assert_eq!(event.name(), "session:terminated");
    }

    #[test]
    fn test_refreshed_payload_carries_no_token() {
        let event = ServerEvent::TokenRefreshed { expires_in: 900 };
        let payload = event.payload();

        assert_eq!(payload["expiresIn"], 900);
        // 广播载荷只有过期信息，不含 token 本体
        assert!(payload.get("accessToken").is_none());
        assert!(payload.get("refreshToken").is_none());
    }
}
