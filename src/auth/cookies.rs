use parking_lot::Mutex;
use std::collections::HashMap;

/// Cookie 名称（与前端 / 测试脚本约定一致）
pub const ACCESS_TOKEN_COOKIE: &str = "access_token";
pub const REFRESH_TOKEN_COOKIE: &str = "refresh_token";
pub const CSRF_TOKEN_COOKIE: &str = "csrf_token";

/// 一次登录/刷新写入响应的 cookie 集合
///
/// access 和 refresh 是 HTTP-only；CSRF token 必须能被
/// 客户端脚本读取，随后放进 X-CSRF-Token 请求头回传。
#[derive(Debug, Clone)]
pub struct AuthCookies {
    pub access_token: String,
    pub refresh_token: String,
    pub csrf_token: String,
    /// access cookie 的 max-age（秒）
    pub access_max_age: i64,
    /// refresh cookie 的 max-age（秒）
    pub refresh_max_age: i64,
}

/// Cookie 写入能力
///
/// 核心只依赖这个抽象，真实 HTTP 层和测试各自提供实现，
/// 不把传输层对象带进认证流程。
pub trait CookieWriter: Send + Sync {
    /// 写入认证 cookie（access/refresh HTTP-only + CSRF 可读）
    fn set_auth_cookies(&self, cookies: &AuthCookies);

    /// 清除所有认证 cookie
    fn clear_auth_cookies(&self);
}

/// 内存 cookie 罐（参考实现，测试用）
#[derive(Default)]
pub struct MemoryCookieJar {
    cookies: Mutex<HashMap<String, String>>,
}

impl MemoryCookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// 读取 cookie 值
    pub fn get(&self, name: &str) -> Option<String> {
        self.cookies.lock().get(name).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.lock().is_empty()
    }
}

impl CookieWriter for MemoryCookieJar {
    fn set_auth_cookies(&self, cookies: &AuthCookies) {
        let mut jar = self.cookies.lock();
        jar.insert(ACCESS_TOKEN_COOKIE.to_string(), cookies.access_token.clone());
        jar.insert(REFRESH_TOKEN_COOKIE.to_string(), cookies.refresh_token.clone());
        jar.insert(CSRF_TOKEN_COOKIE.to_string(), cookies.csrf_token.clone());
    }

    fn clear_auth_cookies(&self) {
        let mut jar = self.cookies.lock();
        jar.remove(ACCESS_TOKEN_COOKIE);
        jar.remove(REFRESH_TOKEN_COOKIE);
        jar.remove(CSRF_TOKEN_COOKIE);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jar_set_and_clear() {
        let jar = MemoryCookieJar::new();

        jar.set_auth_cookies(&AuthCookies {
            access_token: "acc".to_string(),
            refresh_token: "ref".to_string(),
            csrf_token: "csrf".to_string(),
            access_max_age: 900,
            refresh_max_age: 604800,
        });

        assert_eq!(jar.get(ACCESS_TOKEN_COOKIE).as_deref(), Some("acc"));
        assert_eq!(jar.get(REFRESH_TOKEN_COOKIE).as_deref(), Some("ref"));
        assert_eq!(jar.get(CSRF_TOKEN_COOKIE).as_deref(), Some("csrf"));

        jar.clear_auth_cookies();
        assert!(jar.is_empty());
    }
}
