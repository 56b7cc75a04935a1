pub mod search;
pub mod snapshot;

pub use search::{SearchClient, SearchError, SearchParams};
pub use snapshot::{SnapshotClient, SnapshotError, BROWSER_USER_AGENT};
