pub mod events;
pub mod rooms;
pub mod leader;
pub mod gateway;

pub use events::{EventEnvelope, ServerEvent};
pub use rooms::{await_event, RoomRegistry};
pub use leader::{EarliestTabWins, LastClaimWins, LeaderClaim, LeaderElectionPolicy};
pub use gateway::{HandshakeOutcome, HandshakeRequest, SyncGateway};
