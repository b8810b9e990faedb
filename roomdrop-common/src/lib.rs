pub mod backend;
pub mod error;
pub mod record;
pub mod room;

pub use error::StorageError;
pub use record::FileRecord;
pub use room::RoomId;
