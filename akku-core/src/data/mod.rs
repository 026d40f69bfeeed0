//! Tabular data handling: tables, type inference, transforms, statistics and
//! remote sources.

pub mod schema;
pub mod source;
pub mod stats;
pub mod table;
pub mod transform;

pub use schema::{ColumnType, SchemaDefinition, infer_schema, looks_numeric};
pub use source::{DataSource, FetchedDataset, ResourceSource, RowsViewSource};
pub use table::{Table, display_value};
pub use transform::{TransformPipeline, TransformStep};
