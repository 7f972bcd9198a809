pub mod auth;
pub mod config;
pub mod device;
pub mod error;
pub mod logging;
pub mod model;
pub mod realtime;
pub mod session;
pub mod token;

pub use auth::{AuthOrchestrator, CookieWriter, MemoryCookieJar, UserDirectory};
pub use config::AuthConfig;
pub use device::DeviceRegistry;
pub use error::{AuthError, ErrorCode, ErrorResponse, Result};
pub use realtime::{RoomRegistry, SyncGateway};
pub use session::{SessionStore, SessionSweeper};
pub use token::{TokenEngine, TokenPair};
