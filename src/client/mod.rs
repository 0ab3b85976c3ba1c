pub mod connection;
pub mod presence;
pub mod run;
pub mod workspace;

pub use connection::{verify_room, websocket_url, Connection};
pub use presence::{PresencePhase, PresenceTracker};
pub use run::{RunState, RunTracker};
pub use workspace::Workspace;
