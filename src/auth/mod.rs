pub mod password;
pub mod users;
pub mod cookies;
pub mod orchestrator;

pub use cookies::{AuthCookies, CookieWriter, MemoryCookieJar};
pub use orchestrator::{AuthOrchestrator, LoginContext, LoginOutcome};
pub use users::{RegisterUserParams, UserDirectory};
