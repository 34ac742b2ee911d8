//! Storage seams: the series reader, the feature writer and their SQLite
//! implementations
//!
//! ```text
//! observations (sql/01_observations.sql) → SqliteSeriesReader
//!     ↓ (pipeline)
//! FeatureSchema → SqliteFeatureWriter → features_{aggregate,regression_raw,
//!                                        regression_momentum,correlation}
//! ```

pub mod migrations;
pub mod observations;
pub mod reader;
pub mod sqlite_reader;
pub mod sqlite_writer;
pub mod writer_backend;

pub use migrations::run_schema_migrations;
pub use reader::{ReadError, SeriesReader};
pub use sqlite_reader::SqliteSeriesReader;
pub use sqlite_writer::SqliteFeatureWriter;
pub use writer_backend::{FeatureWriter, SchemaError, WriteError};
