pub mod invite_code;
pub mod leagues;
pub mod object_storage;
pub mod summary;

pub use leagues::LeagueDirectory;
pub use object_storage::{HttpObjectStorage, NoopStorage, ObjectStorage};
pub use summary::{HttpSummaryClient, StaticSummary, SummaryService};
