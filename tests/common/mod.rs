#![allow(dead_code)]

use authsync::auth::orchestrator::AuthOrchestrator;
use authsync::auth::users::{RegisterUserParams, UserDirectory};
use authsync::auth::LoginContext;
use authsync::config::AuthConfig;
use authsync::device::DeviceRegistry;
use authsync::model::{DeviceSignals, User, UserRole};
use authsync::realtime::{RoomRegistry, SyncGateway};
use authsync::session::SessionStore;
use authsync::token::TokenEngine;
use std::sync::Arc;

/// 组装完整的核心栈（内存实现，每个测试独立一套）
pub struct TestHarness {
    pub config: Arc<AuthConfig>,
    pub users: Arc<UserDirectory>,
    pub devices: Arc<DeviceRegistry>,
    pub sessions: Arc<SessionStore>,
    pub tokens: Arc<TokenEngine>,
    pub rooms: Arc<RoomRegistry>,
    pub gateway: Arc<SyncGateway>,
    pub orchestrator: AuthOrchestrator,
}

pub fn harness() -> TestHarness {
    harness_with(AuthConfig::for_testing())
}

pub fn harness_with(config: AuthConfig) -> TestHarness {
    let config = Arc::new(config);
    let users = Arc::new(UserDirectory::new(config.clone()));
    let devices = Arc::new(DeviceRegistry::new());
    let sessions = Arc::new(SessionStore::new(config.clone()));
    let tokens = Arc::new(TokenEngine::new(&config));
    let rooms = Arc::new(RoomRegistry::new());
    let gateway = Arc::new(SyncGateway::new(
        config.clone(),
        tokens.clone(),
        sessions.clone(),
        devices.clone(),
        rooms.clone(),
    ));
    let orchestrator = AuthOrchestrator::new(
        config.clone(),
        users.clone(),
        devices.clone(),
        sessions.clone(),
        tokens.clone(),
        gateway.clone(),
    );

    TestHarness {
        config,
        users,
        devices,
        sessions,
        tokens,
        rooms,
        gateway,
        orchestrator,
    }
}

pub fn register_user(harness: &TestHarness, email: &str) -> User {
    harness
        .users
        .register_user(RegisterUserParams {
            email: email.to_string(),
            password: "secret123".to_string(),
            first_name: "Alice".to_string(),
            last_name: "Zhang".to_string(),
            role: UserRole::Customer,
            timezone: Some("Asia/Shanghai".to_string()),
        })
        .unwrap()
}

/// 桌面 Chrome 的设备信号
pub fn desktop_chrome() -> DeviceSignals {
    DeviceSignals {
        browser: "Chrome 120".to_string(),
        os: "Windows 11".to_string(),
        platform: "Win32".to_string(),
        screen_resolution: "1920x1080".to_string(),
        timezone: "Asia/Shanghai".to_string(),
        language: "zh-CN".to_string(),
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) Chrome/120.0".to_string(),
    }
}

/// 移动端 Safari 的设备信号
pub fn mobile_safari() -> DeviceSignals {
    DeviceSignals {
        browser: "Safari 17".to_string(),
        os: "iOS 17".to_string(),
        platform: "iPhone".to_string(),
        screen_resolution: "390x844".to_string(),
        timezone: "Asia/Shanghai".to_string(),
        language: "zh-CN".to_string(),
        user_agent: "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) Mobile Safari".to_string(),
    }
}

pub fn login_context(signals: DeviceSignals, tab_id: &str) -> LoginContext {
    LoginContext {
        ip_address: "203.0.113.10".to_string(),
        user_agent: signals.user_agent.clone(),
        signals,
        tab_id: Some(tab_id.to_string()),
    }
}
