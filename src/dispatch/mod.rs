pub mod record;
pub mod registry;

pub use record::Record;
pub use registry::{FnHandler, RecordDispatcher, RecordHandler};
