//! census_api
//!
//! A typed, synchronous client for the US Census Bureau data API, plus
//! the small estimators Census data keeps needing (margin-of-error
//! aggregation, percentile interpolation over binned distributions).
//!
//! ### Features
//! - Geography-scoped accessors (state, county, tract, block group,
//!   place, districts, ZCTA, MSA/CSA) over year-scoped datasets
//! - Transparent chunking of field lists past the API's 50-column cap,
//!   with positional row merging
//! - Per-field type coercion driven by the API's own `predicateType`
//!   metadata, cached per client
//! - Fail-fast supported-year checks before any network traffic
//! - CSV/JSON export of query results
//!
//! ### Example
//! ```no_run
//! use census_api::Census;
//!
//! let census = Census::new("my-api-key");
//! let rows = census.acs5.state_county(
//!     &["NAME", "B01001_001E"],
//!     "24",
//!     "031",
//!     None,
//! )?;
//! census_api::storage::save_csv(&rows, "montgomery.csv")?;
//!
//! let median_age = census_api::stats::linear_percentile(
//!     &[(216350.0, (0.0, 4.0)), (201692.0, (5.0, 9.0))],
//!     0.5,
//! );
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod api;
pub mod dataset;
pub mod error;
pub mod geo;
pub mod stats;
pub mod storage;

pub use api::{Census, Client, MAX_FIELDS_PER_QUERY, PredicateType, Record, RetryPolicy};
pub use dataset::Dataset;
pub use error::{Error, Result};
pub use geo::{ALL, AreaSource, Feature, GeographySpec};
