pub mod fingerprint;
pub mod registry;
pub mod security;

pub use fingerprint::generate_enhanced_fingerprint;
pub use registry::{DeviceRegistry, DeviceConsistency};
pub use security::{assess_device_security, RiskLevel, SecurityAssessment, TrustLevel};
