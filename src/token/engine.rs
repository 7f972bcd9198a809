use crate::config::AuthConfig;
use crate::error::{AuthError, Result};
use crate::token::blacklist::TokenBlacklist;
use crate::token::claims::{TokenClaims, TokenKind};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// CSRF token 长度
const CSRF_TOKEN_LEN: usize = 32;

/// Token 三元组中的签名部分（access + refresh）
///
/// CSRF token 是会话绑定的随机串，不走 JWT，由登录流程单独生成。
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token 有效期（秒）
    pub access_expires_in: i64,
    /// Refresh token 有效期（秒）
    pub refresh_expires_in: i64,
    /// 新 refresh token 的 jti（会话需要记录它以便登出时吊销）
    pub refresh_jti: String,
}

/// Token 签发和验证服务 (HS256 对称加密)
///
/// 无状态签发 + 黑名单轮换账本。轮换的单次使用保证见
/// `rotate_refresh_token`。
pub struct TokenEngine {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    audience: String,
    access_ttl: i64,
    refresh_ttl: i64,
    remember_me_refresh_ttl: i64,
    blacklist: Arc<TokenBlacklist>,
}

impl TokenEngine {
    /// 创建 Token 引擎
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            access_ttl: config.access_ttl_secs,
            refresh_ttl: config.refresh_ttl_secs,
            remember_me_refresh_ttl: config.remember_me_refresh_ttl_secs,
            blacklist: Arc::new(TokenBlacklist::new()),
        }
    }

    /// 黑名单句柄（清扫任务定期调用 cleanup_expired）
    pub fn blacklist(&self) -> Arc<TokenBlacklist> {
        self.blacklist.clone()
    }

    /// 签发 access token
    pub fn generate_access_token(
        &self,
        user_id: &str,
        session_id: &str,
        device_id: &str,
        role: &str,
    ) -> Result<String> {
        let (token, _jti) = self.sign(user_id, session_id, device_id, role, TokenKind::Access, self.access_ttl)?;
        Ok(token)
    }

    /// 签发 refresh token，返回 (token, jti)
    pub fn generate_refresh_token(
        &self,
        user_id: &str,
        session_id: &str,
        device_id: &str,
        role: &str,
        remember_me: bool,
    ) -> Result<(String, String)> {
        let ttl = if remember_me {
            self.remember_me_refresh_ttl
        } else {
            self.refresh_ttl
        };
        self.sign(user_id, session_id, device_id, role, TokenKind::Refresh, ttl)
    }

    /// 签发 access + refresh 对
    pub fn generate_token_pair(
        &self,
        user_id: &str,
        session_id: &str,
        device_id: &str,
        role: &str,
        remember_me: bool,
    ) -> Result<TokenPair> {
        let access_token = self.generate_access_token(user_id, session_id, device_id, role)?;
        let (refresh_token, refresh_jti) =
            self.generate_refresh_token(user_id, session_id, device_id, role, remember_me)?;

        let refresh_ttl = if remember_me {
            self.remember_me_refresh_ttl
        } else {
            self.refresh_ttl
        };

        Ok(TokenPair {
            access_token,
            refresh_token,
            access_expires_in: self.access_ttl,
            refresh_expires_in: refresh_ttl,
            refresh_jti,
        })
    }

    /// 生成 CSRF token（不透明随机串，与会话绑定，不含签名声明）
    pub fn generate_csrf_token(&self) -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(CSRF_TOKEN_LEN)
            .map(char::from)
            .collect()
    }

    /// 验证 access token
    pub fn verify_access_token(&self, token: &str) -> Result<TokenClaims> {
        self.verify(token, TokenKind::Access)
    }

    /// 验证 refresh token（含黑名单检查）
    ///
    /// 黑名单命中时即使签名仍然有效也必须拒绝。
    pub fn verify_refresh_token(&self, token: &str) -> Result<TokenClaims> {
        let claims = self.verify(token, TokenKind::Refresh)?;

        if self.blacklist.is_revoked(&claims.jti) {
            return Err(AuthError::TokenRevoked(
                "refresh token has been revoked".to_string(),
            ));
        }

        Ok(claims)
    }

    /// Refresh token 轮换（单次使用）
    ///
    /// 1. 验证旧 token（签名/过期/种类）
    /// 2. 原子消费旧 jti —— 并发提交同一个旧 token 时只有一个调用拿到消费权，
    ///    输家返回 TokenRevoked，绝不会出现两对同时有效的新 token
    /// 3. 给同一会话签发新的 access + refresh 对
    pub fn rotate_refresh_token(&self, old_refresh_token: &str) -> Result<TokenPair> {
        // 1. 签名与过期验证（不查黑名单，消费一步本身就是检查）
        let claims = self.verify(old_refresh_token, TokenKind::Refresh)?;

        // 2. 原子检查并占用
        if !self.blacklist.consume(&claims.jti, claims.exp) {
            warn!(
                "❌ refresh token 重放被拒绝: session={}, jti={}",
                claims.session_id, claims.jti
            );
            return Err(AuthError::TokenRevoked(
                "refresh token already consumed by rotation".to_string(),
            ));
        }

        // 3. 轮换出新的一对，绑定原会话
        let remember_me = claims.exp - claims.iat > self.refresh_ttl;
        let pair = self.generate_token_pair(
            &claims.sub,
            &claims.session_id,
            &claims.device_id,
            &claims.role,
            remember_me,
        )?;

        info!(
            "✅ Token 轮换成功: session={}, old_jti={}, new_jti={}",
            claims.session_id, claims.jti, pair.refresh_jti
        );

        Ok(pair)
    }

    /// 吊销一个 token（幂等）
    ///
    /// 忽略过期校验解码：客户端拿着已过期的 refresh token 登出时
    /// 仍然要把 jti 记入黑名单。
    pub fn revoke_token(&self, token: &str) -> Result<()> {
        let mut validation = self.base_validation();
        validation.validate_exp = false;

        let token_data = decode::<TokenClaims>(token, &self.decoding_key, &validation)
            .map_err(|e| AuthError::TokenInvalid(e.to_string()))?;

        self.blacklist
            .revoke(&token_data.claims.jti, token_data.claims.exp);
        Ok(())
    }

    /// 按 jti 直接吊销（调用方已持有 claims 时使用）
    pub fn revoke_jti(&self, jti: &str, exp: i64) {
        self.blacklist.revoke(jti, exp);
    }

    /// Access token 有效期（秒）
    pub fn access_ttl(&self) -> i64 {
        self.access_ttl
    }

    fn sign(
        &self,
        user_id: &str,
        session_id: &str,
        device_id: &str,
        role: &str,
        kind: TokenKind,
        ttl: i64,
    ) -> Result<(String, String)> {
        let now = Utc::now().timestamp();
        let jti = Uuid::new_v4().to_string();

        let claims = TokenClaims {
            iss: self.issuer.clone(),
            sub: user_id.to_string(),
            aud: self.audience.clone(),
            exp: now + ttl,
            iat: now,
            jti: jti.clone(),
            typ: kind,
            session_id: session_id.to_string(),
            device_id: device_id.to_string(),
            role: role.to_string(),
        };

        let header = Header::new(Algorithm::HS256);
        let token = encode(&header, &claims, &self.encoding_key)
            .map_err(|e| AuthError::Internal(format!("JWT 签发失败: {}", e)))?;

        debug!(
            "签发 {} token: user={}, session={}, jti={}",
            kind.as_str(),
            user_id,
            session_id,
            jti
        );

        Ok((token, jti))
    }

    /// 验证签名/过期/签发者/受众，并确认 token 种类
    fn verify(&self, token: &str, expected_kind: TokenKind) -> Result<TokenClaims> {
        let validation = self.base_validation();

        let token_data =
            decode::<TokenClaims>(token, &self.decoding_key, &validation).map_err(|e| {
                use jsonwebtoken::errors::ErrorKind;
                match e.kind() {
                    ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                    ErrorKind::InvalidSignature => {
                        AuthError::TokenInvalid("signature verification failed".to_string())
                    }
                    _ => AuthError::TokenInvalid(e.to_string()),
                }
            })?;

        if token_data.claims.typ != expected_kind {
            return Err(AuthError::TokenInvalid(format!(
                "expected {} token, got {}",
                expected_kind.as_str(),
                token_data.claims.typ.as_str()
            )));
        }

        Ok(token_data.claims)
    }

    fn base_validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        // 秒级过期测试依赖零容差
        validation.leeway = 0;
        validation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_engine() -> TokenEngine {
        TokenEngine::new(&AuthConfig::for_testing())
    }

    #[test]
    fn test_issue_and_verify_access_token() {
        let engine = create_engine();

        let token = engine
            .generate_access_token("user-1", "session-1", "device-1", "customer")
            .unwrap();
        let claims = engine.verify_access_token(&token).unwrap();

        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.session_id, "session-1");
        assert_eq!(claims.device_id, "device-1");
        assert_eq!(claims.role, "customer");
        assert_eq!(claims.typ, TokenKind::Access);
    }

    #[test]
    fn test_refresh_token_rejected_as_access() {
        let engine = create_engine();

        let (refresh, _jti) = engine
            .generate_refresh_token("user-1", "session-1", "device-1", "customer", false)
            .unwrap();

        let result = engine.verify_access_token(&refresh);
        assert!(matches!(result, Err(AuthError::TokenInvalid(_))));
    }

    #[test]
    fn test_tampered_token_reports_signature_failure() {
        let engine = create_engine();

        let token = engine
            .generate_access_token("user-1", "session-1", "device-1", "customer")
            .unwrap();

        // 篡改签名段
        let mut parts: Vec<&str> = token.split('.').collect();
        let tampered_sig = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";
        parts[2] = tampered_sig;
        let tampered = parts.join(".");

        match engine.verify_access_token(&tampered) {
            Err(AuthError::TokenInvalid(msg)) => assert!(msg.contains("signature")),
            other => panic!("expected TokenInvalid, got {:?}", other),
        }
    }

    #[test]
    fn test_garbage_token_is_invalid() {
        let engine = create_engine();
        let result = engine.verify_access_token("not.a.token");
        assert!(matches!(result, Err(AuthError::TokenInvalid(_))));
    }

    #[test]
    fn test_rotation_consumes_old_token() {
        let engine = create_engine();

        let (refresh, _) = engine
            .generate_refresh_token("user-1", "session-1", "device-1", "customer", false)
            .unwrap();

        let pair = engine.rotate_refresh_token(&refresh).unwrap();
        assert_ne!(pair.refresh_token, refresh);
        // 新 access token 可正常验证
        assert!(engine.verify_access_token(&pair.access_token).is_ok());

        // 旧 token 第二次轮换必须被拒绝
        match engine.rotate_refresh_token(&refresh) {
            Err(AuthError::TokenRevoked(msg)) => assert!(msg.contains("consumed")),
            other => panic!("expected TokenRevoked, got {:?}", other),
        }
    }

    #[test]
    fn test_revoked_token_fails_verification() {
        let engine = create_engine();

        let (refresh, _) = engine
            .generate_refresh_token("user-1", "session-1", "device-1", "customer", false)
            .unwrap();

        engine.revoke_token(&refresh).unwrap();

        match engine.verify_refresh_token(&refresh) {
            Err(AuthError::TokenRevoked(msg)) => assert!(msg.contains("revoked")),
            other => panic!("expected TokenRevoked, got {:?}", other),
        }
        // 轮换同样被拒绝
        assert!(engine.rotate_refresh_token(&refresh).is_err());
    }

    #[test]
    fn test_csrf_token_is_opaque_and_unique() {
        let engine = create_engine();

        let a = engine.generate_csrf_token();
        let b = engine.generate_csrf_token();

        assert_eq!(a.len(), CSRF_TOKEN_LEN);
        assert_ne!(a, b);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[tokio::test]
    async fn test_expired_token_fails_typed() {
        let config = AuthConfig {
            access_ttl_secs: 1,
            ..AuthConfig::for_testing()
        };
        let engine = TokenEngine::new(&config);

        let token = engine
            .generate_access_token("user-1", "session-1", "device-1", "customer")
            .unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(2100)).await;

        match engine.verify_access_token(&token) {
            Err(AuthError::TokenExpired) => {}
            other => panic!("expected TokenExpired, got {:?}", other),
        }
    }
}
