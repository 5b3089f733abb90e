//! Result traversal: the cursor state machine and the shapes rows are
//! fetched in.

pub mod cursor;
pub mod fetch;
pub mod row;

pub use cursor::ResultCursor;
pub use fetch::{ColumnRef, FetchShape, FetchedRow, InsertIdType, RowCollection};
pub use row::{ColumnSet, CustomDbRow};
