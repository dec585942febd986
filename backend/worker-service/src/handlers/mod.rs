pub mod media_processing;
pub mod notification;
pub mod search_index;

pub use media_processing::{LoggingMediaSink, MediaProcessingHandler, MediaSink};
pub use notification::{LoggingSink, NotificationHandler, NotificationSink};
pub use search_index::{LoggingSearchBackend, SearchBackend, SearchIndexHandler};
