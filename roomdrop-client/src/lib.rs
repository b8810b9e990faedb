pub mod api;
pub mod config;
pub mod error;
pub mod file_set;
pub mod reconciler;
pub mod session;

pub use api::{HttpRoomClient, RoomTransport};
pub use error::ClientError;
pub use file_set::{merge, ClientFileSet};
pub use reconciler::{ListingReconciler, RoomView};
pub use session::RoomSession;
