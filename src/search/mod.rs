//! Query side of the engine: index snapshots, ranking, the query engine and
//! result cursors.

pub mod cursor;
pub mod engine;
pub mod index;
pub mod scoring;
pub mod state;

pub use cursor::{Page, ResultCursor};
pub use engine::{QueryEngine, Suggestion};
pub use index::IndexSnapshot;
pub use state::{QueryState, SearchHandle};
