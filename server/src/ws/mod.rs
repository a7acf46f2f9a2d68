pub mod actor;
pub mod broadcast;
pub mod handler;
pub mod registry;

use tokio::sync::mpsc;

pub use registry::{ConnectionRegistry, PruneReport, Viewer};

/// Process-unique identifier of one viewer connection.
pub type ConnectionId = u64;

/// Sender half of a viewer connection's outbound queue.
/// The connection's writer task owns the receiving half and is the only
/// thing that ever writes to the socket.
pub type ConnectionSender = mpsc::Sender<axum::extract::ws::Message>;
