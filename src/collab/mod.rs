pub mod document;
pub mod protocol;
pub mod room;
mod server;
mod session;

pub use server::{generate_client_id, CollabServer};
pub use session::SessionHandler;
