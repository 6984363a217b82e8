pub mod async_writer;
pub mod inbox;
pub mod metrics;
pub mod registry;
pub mod retention_cleaner;

pub use async_writer::*;
pub use inbox::*;
pub use metrics::*;
pub use registry::*;
pub use retention_cleaner::*;
