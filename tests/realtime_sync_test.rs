mod common;

use authsync::auth::cookies::MemoryCookieJar;
use authsync::auth::LoginOutcome;
use authsync::error::AuthError;
use authsync::realtime::events::{HeartbeatPayload, TokenRefreshPayload};
use authsync::realtime::rooms::await_event;
use authsync::realtime::{HandshakeRequest, LeaderClaim};
use chrono::Utc;
use common::{desktop_chrome, harness, login_context, mobile_safari, register_user, TestHarness};
use std::time::Duration;

async fn login(h: &TestHarness, signals: authsync::model::DeviceSignals, tab: &str) -> LoginOutcome {
    let jar = MemoryCookieJar::new();
    h.orchestrator
        .login(
            "alice@example.com",
            "secret123",
            login_context(signals, tab),
            false,
            &jar,
        )
        .await
        .unwrap()
}

fn handshake_request(outcome: &LoginOutcome, tab_id: &str) -> HandshakeRequest {
    HandshakeRequest {
        access_token: Some(outcome.tokens.access_token.clone()),
        csrf_token: Some(outcome.session.csrf_token.clone()),
        device_id: outcome.device.id.clone(),
        tab_id: tab_id.to_string(),
    }
}

#[tokio::test]
async fn test_handshake_joins_all_rooms_and_acks() {
    let h = harness();
    register_user(&h, "alice@example.com");
    let outcome = login(&h, desktop_chrome(), "tab-1").await;

    let mut rx = h.rooms.register("conn-1");
    let result = h
        .gateway
        .authenticate_connection("conn-1", handshake_request(&outcome, "tab-1"))
        .await
        .unwrap();

    assert_eq!(result.user_id, outcome.user.id);
    assert_eq!(result.session_id, outcome.session.id);
    assert_eq!(result.rooms.len(), 4);
    assert!(result.rooms.contains(&format!("user:{}", outcome.user.id)));
    assert!(result.rooms.contains(&format!("session:{}", outcome.session.id)));
    assert!(result.rooms.contains(&"tab:tab-1".to_string()));

    // 回执只发给本连接
    let ack = await_event(&mut rx, "auth:success", Duration::from_millis(200))
        .await
        .expect("auth:success");
    assert_eq!(ack.payload["sessionId"], outcome.session.id);
}

#[tokio::test]
async fn test_handshake_without_token_is_rejected() {
    let h = harness();
    register_user(&h, "alice@example.com");
    let outcome = login(&h, desktop_chrome(), "tab-1").await;

    let mut rx = h.rooms.register("conn-1");
    let mut request = handshake_request(&outcome, "tab-1");
    request.access_token = None;

    let result = h.gateway.authenticate_connection("conn-1", request).await;
    assert!(matches!(result, Err(AuthError::Unauthorized(_))));

    // 客户端能看到类型化的连接失败
    let err = await_event(&mut rx, "auth:error", Duration::from_millis(200))
        .await
        .expect("auth:error");
    assert!(err.payload["message"].as_str().unwrap().contains("token"));

    // 没有部分加入：会话房间里没有这个连接
    assert!(h.rooms.members(&outcome.session.session_room()).is_empty());
    // 失败后连接被断开，通道关闭
    assert!(rx.recv().await.is_none());
}

#[tokio::test]
async fn test_handshake_rejects_csrf_mismatch_and_foreign_device() {
    let h = harness();
    register_user(&h, "alice@example.com");
    let outcome = login(&h, desktop_chrome(), "tab-1").await;

    // CSRF 不匹配
    h.rooms.register("conn-1");
    let mut request = handshake_request(&outcome, "tab-1");
    request.csrf_token = Some("forged".to_string());
    let result = h.gateway.authenticate_connection("conn-1", request).await;
    assert!(matches!(result, Err(AuthError::CsrfMismatch)));

    // 声明的设备不属于 token 用户
    let other = {
        let jar = MemoryCookieJar::new();
        h.users
            .register_user(authsync::auth::RegisterUserParams {
                email: "bob@example.com".to_string(),
                password: "secret123".to_string(),
                first_name: "Bob".to_string(),
                last_name: "Li".to_string(),
                role: authsync::model::UserRole::Customer,
                timezone: None,
            })
            .unwrap();
        h.orchestrator
            .login(
                "bob@example.com",
                "secret123",
                login_context(mobile_safari(), "tab-9"),
                false,
                &jar,
            )
            .await
            .unwrap()
    };

    h.rooms.register("conn-2");
    let mut request = handshake_request(&outcome, "tab-1");
    request.device_id = other.device.id.clone();
    let result = h.gateway.authenticate_connection("conn-2", request).await;
    assert!(matches!(result, Err(AuthError::DeviceMismatch(_))));
}

#[tokio::test]
async fn test_handshake_rejects_terminated_session() {
    let h = harness();
    let user = register_user(&h, "alice@example.com");
    let outcome = login(&h, desktop_chrome(), "tab-1").await;

    h.sessions.terminate_all_user_sessions(&user.id);

    h.rooms.register("conn-1");
    let result = h
        .gateway
        .authenticate_connection("conn-1", handshake_request(&outcome, "tab-1"))
        .await;
    assert!(matches!(result, Err(AuthError::SessionExpired(_))));
}

#[tokio::test]
async fn test_cross_tab_refresh_convergence() {
    // 两个连接共享一个会话房间，一个发起刷新，双方都先于超时收到同一个事件
    let h = harness();
    register_user(&h, "alice@example.com");
    let outcome = login(&h, desktop_chrome(), "tab-1").await;

    let mut rx_a = h.rooms.register("conn-a");
    let mut rx_b = h.rooms.register("conn-b");
    h.gateway
        .authenticate_connection("conn-a", handshake_request(&outcome, "tab-1"))
        .await
        .unwrap();
    h.gateway
        .authenticate_connection("conn-b", handshake_request(&outcome, "tab-2"))
        .await
        .unwrap();

    let pair = h
        .gateway
        .handle_token_refresh(
            "conn-a",
            &outcome.tokens.refresh_token,
            TokenRefreshPayload {
                tab_id: "tab-1".to_string(),
                timestamp: Utc::now().timestamp_millis(),
                is_leader: true,
            },
        )
        .unwrap();

    let event_a = await_event(&mut rx_a, "token:refreshed", Duration::from_secs(1))
        .await
        .expect("tab-1 receives token:refreshed");
    let event_b = await_event(&mut rx_b, "token:refreshed", Duration::from_secs(1))
        .await
        .expect("tab-2 receives token:refreshed");

    // 双方看到一致的过期信息，且与返回给发起方的一致
    assert_eq!(event_a.payload["expiresIn"], event_b.payload["expiresIn"]);
    assert_eq!(event_a.payload["expiresIn"], pair.access_expires_in);
    // 广播不泄漏 token 本体
    assert!(event_a.payload.get("accessToken").is_none());
}

#[tokio::test]
async fn test_refresh_failure_notifies_requester_only() {
    let h = harness();
    register_user(&h, "alice@example.com");
    let outcome = login(&h, desktop_chrome(), "tab-1").await;

    let mut rx_a = h.rooms.register("conn-a");
    let mut rx_b = h.rooms.register("conn-b");
    h.gateway
        .authenticate_connection("conn-a", handshake_request(&outcome, "tab-1"))
        .await
        .unwrap();
    h.gateway
        .authenticate_connection("conn-b", handshake_request(&outcome, "tab-2"))
        .await
        .unwrap();

    let result = h.gateway.handle_token_refresh(
        "conn-a",
        "garbage.refresh.token",
        TokenRefreshPayload {
            tab_id: "tab-1".to_string(),
            timestamp: Utc::now().timestamp_millis(),
            is_leader: true,
        },
    );
    assert!(result.is_err());

    // 错误只到发起连接
    assert!(
        await_event(&mut rx_a, "token:refresh_error", Duration::from_millis(200))
            .await
            .is_some()
    );
    assert!(
        await_event(&mut rx_b, "token:refresh_error", Duration::from_millis(100))
            .await
            .is_none()
    );
}

#[tokio::test]
async fn test_leader_election_converges_across_tabs() {
    let h = harness();
    register_user(&h, "alice@example.com");
    let outcome = login(&h, desktop_chrome(), "tab-1").await;

    let mut rx_a = h.rooms.register("conn-a");
    let mut rx_b = h.rooms.register("conn-b");
    h.gateway
        .authenticate_connection("conn-a", handshake_request(&outcome, "tab-1"))
        .await
        .unwrap();
    h.gateway
        .authenticate_connection("conn-b", handshake_request(&outcome, "tab-2"))
        .await
        .unwrap();

    // 后创建的标签页先声明
    h.gateway
        .handle_leader_claim(
            "conn-b",
            LeaderClaim {
                tab_id: "tab-2".to_string(),
                tab_created_at: 2000,
            },
        )
        .unwrap();

    let first = await_event(&mut rx_a, "leader:elected", Duration::from_millis(200))
        .await
        .expect("first election");
    assert_eq!(first.payload["tabId"], "tab-2");

    // 更早创建的标签页随后声明：裁决翻转，所有标签页收到同一当选者
    h.gateway
        .handle_leader_claim(
            "conn-a",
            LeaderClaim {
                tab_id: "tab-1".to_string(),
                tab_created_at: 1000,
            },
        )
        .unwrap();

    let elected_a = await_event(&mut rx_a, "leader:elected", Duration::from_millis(200))
        .await
        .expect("tab-1 sees election");
    let elected_b = loop {
        // conn-b 会先收到第一轮的 tab-2，取最后一条 leader:elected
        let event = await_event(&mut rx_b, "leader:elected", Duration::from_millis(200))
            .await
            .expect("tab-2 sees election");
        if event.payload["tabId"] == "tab-1" {
            break event;
        }
    };

    assert_eq!(elected_a.payload["tabId"], "tab-1");
    assert_eq!(elected_b.payload["tabId"], "tab-1");

    // 晚到的重复声明不改变结果，只是重播现任
    h.gateway
        .handle_leader_claim(
            "conn-b",
            LeaderClaim {
                tab_id: "tab-2".to_string(),
                tab_created_at: 2000,
            },
        )
        .unwrap();
    let replay = await_event(&mut rx_b, "leader:elected", Duration::from_millis(200))
        .await
        .expect("replayed election");
    assert_eq!(replay.payload["tabId"], "tab-1");
}

#[tokio::test]
async fn test_heartbeat_response_and_peer_awareness() {
    let h = harness();
    register_user(&h, "alice@example.com");
    let chrome = login(&h, desktop_chrome(), "tab-1").await;
    let safari = login(&h, mobile_safari(), "tab-2").await;

    let mut rx_chrome = h.rooms.register("conn-chrome");
    let mut rx_safari = h.rooms.register("conn-safari");
    h.gateway
        .authenticate_connection("conn-chrome", handshake_request(&chrome, "tab-1"))
        .await
        .unwrap();
    h.gateway
        .authenticate_connection("conn-safari", handshake_request(&safari, "tab-2"))
        .await
        .unwrap();

    h.gateway
        .handle_heartbeat(
            "conn-chrome",
            HeartbeatPayload {
                tab_id: "tab-1".to_string(),
                timestamp: Utc::now().timestamp_millis(),
                is_leader: true,
            },
        )
        .unwrap();

    // 发起方拿到心跳回执
    assert!(
        await_event(&mut rx_chrome, "heartbeat:response", Duration::from_millis(200))
            .await
            .is_some()
    );

    // 同一用户的另一台设备通过用户房间感知到对端在线
    let peer = await_event(&mut rx_safari, "device:connected", Duration::from_millis(200))
        .await
        .expect("device:connected");
    assert_eq!(peer.payload["deviceId"], chrome.device.id);
}

#[tokio::test]
async fn test_termination_delivers_reason_before_disconnect() {
    let h = harness();
    register_user(&h, "alice@example.com");
    let outcome = login(&h, desktop_chrome(), "tab-1").await;

    let mut rx = h.rooms.register("conn-1");
    h.gateway
        .authenticate_connection("conn-1", handshake_request(&outcome, "tab-1"))
        .await
        .unwrap();

    let jar = MemoryCookieJar::new();
    h.orchestrator
        .logout(&outcome.session.id, &outcome.session.csrf_token, &jar)
        .await
        .unwrap();

    // 终止事件先到达，带着原因；之后通道才关闭
    let event = await_event(&mut rx, "session:terminated", Duration::from_millis(200))
        .await
        .expect("session:terminated");
    assert_eq!(event.payload["sessionId"], outcome.session.id);
    assert_eq!(event.payload["reason"], "logout");
    assert!(rx.recv().await.is_none());

    // 房间成员关系已清空
    assert!(h.rooms.members(&outcome.session.session_room()).is_empty());
}

#[tokio::test]
async fn test_heartbeat_from_unauthenticated_connection_fails() {
    let h = harness();
    register_user(&h, "alice@example.com");
    login(&h, desktop_chrome(), "tab-1").await;

    h.rooms.register("conn-unknown");
    let result = h.gateway.handle_heartbeat(
        "conn-unknown",
        HeartbeatPayload {
            tab_id: "tab-x".to_string(),
            timestamp: Utc::now().timestamp_millis(),
            is_leader: false,
        },
    );
    assert!(matches!(result, Err(AuthError::Unauthorized(_))));
}
