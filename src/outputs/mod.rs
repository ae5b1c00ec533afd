//! Writers for query results.
//!
//! # Submodules
//!
//! - [`json`]: Writes results as pretty JSON files, one directory per day
//!
//! # Output Structure
//!
//! ```text
//! json_output_dir/
//! └── 2025-10-16/
//!     ├── latest.json
//!     ├── trending.json
//!     └── summary.json
//! ```

pub mod json;
