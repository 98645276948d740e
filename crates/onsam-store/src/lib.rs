pub mod rows;
pub mod sqlite;

pub use rows::{AuditedXconn, ConnectionParams, ConnectionRow, EndpointView, ResourceView, SliceEntry};
pub use sqlite::{RoadmStore, StoreSession};
