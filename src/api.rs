//! Synchronous client for the **US Census Bureau data API**.
//!
//! The client turns a field list plus a geography predicate into one or
//! more GET requests against the dataset's year-scoped endpoint, decodes
//! the array-of-arrays JSON body into field-named records, and coerces
//! each cell through the field's declared predicate type (looked up once
//! per field and year, then cached).
//!
//! ### Notes
//! - The API caps a single request at 50 columns; [`Client::get`] splits
//!   longer field lists and merges the per-request rows by position.
//! - Error pages (invalid key, transient internal errors) arrive with
//!   status 200 and are recognized by body markers.
//! - Timeouts use a sane default (30s) and can be adjusted by passing a
//!   pre-built `reqwest` client to [`Client::with_http`].
//!
//! Typical usage:
//! ```no_run
//! # use census_api::{Client, GeographySpec, dataset};
//! let client = Client::new("my-api-key", dataset::ACS5);
//! let rows = client.get(
//!     &["NAME", "B01001_001E"],
//!     &GeographySpec::state_county("24", "031"),
//!     None,
//! )?;
//! # Ok::<(), anyhow::Error>(())
//! ```

use std::sync::Mutex;
use std::time::Duration;

use ahash::AHashMap;
use indexmap::IndexMap;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC};
use reqwest::blocking::Client as HttpClient;
use reqwest::redirect::Policy;
use serde_json::Value;

use crate::dataset::{self, DEFAULT_BASE_URL, Dataset};
use crate::error::{Error, Result};
use crate::geo::{AreaSource, Feature, GeographySpec};

/// Per-request column cap enforced by the API.
pub const MAX_FIELDS_PER_QUERY: usize = 50;

/// Marker in the HTML page the API serves (with status 200) when the key
/// is missing or rejected.
const INVALID_KEY_MARKER: &str = "<title>Invalid Key</title>";

/// Body fragment of the API's transient internal error, also served with
/// status 200 and a non-JSON body.
const TRANSIENT_ERROR_MARKER: &str = "There was an error while running your query.";

/// A decoded row: field name to coerced value, keys in response order.
pub type Record = IndexMap<String, Value>;

/// How a field's raw value must be coerced, from the variable
/// definition's `predicateType` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredicateType {
    /// Plain string (also the fail-open default).
    Str,
    /// `fips-for`/`fips-in` geography identifiers; kept as strings so
    /// leading zeros survive.
    Fips,
    /// Numeric column that sometimes carries sentinel text: parsed as a
    /// number, falling back to the raw string.
    IntOrStr,
    /// Strictly numeric.
    Float,
}

/// Retry policy for transient, API-attributed internal errors. Other
/// failures are never retried.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: usize,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3 }
    }
}

impl RetryPolicy {
    /// Whether a 200 body is the API's transient internal-error apology.
    pub fn is_transient(body: &str) -> bool {
        body.contains(TRANSIENT_ERROR_MARKER)
    }
}

// Allow the characters the API's parameters rely on unescaped: predicate
// separators (`:`), wildcards (`*`), field-list commas, and the usual
// identifier characters. Spaces in geography levels become %20.
const SAFE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b':')
    .remove(b'*')
    .remove(b',')
    .remove(b'/');

fn enc(s: &str) -> String {
    percent_encoding::utf8_percent_encode(s, SAFE).to_string()
}

fn default_http() -> HttpClient {
    HttpClient::builder()
        .timeout(Duration::from_secs(30))
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(5))
        .user_agent(concat!("census-api/", env!("CARGO_PKG_VERSION")))
        .build()
        .expect("reqwest client build")
}

/// A client for one dataset. Construct directly, or through [`Census`]
/// to get every built-in dataset sharing one HTTP session.
#[derive(Debug)]
pub struct Client {
    key: String,
    dataset: Dataset,
    default_year: u32,
    base_url: String,
    retry: RetryPolicy,
    http: HttpClient,
    /// Predicate types by (field, year). Year is part of the key because
    /// the same field id can change type across vintages. Never
    /// invalidated: stale coercion on a mid-process metadata change is an
    /// accepted risk.
    types: Mutex<AHashMap<(String, u32), PredicateType>>,
}

impl Client {
    pub fn new(key: impl Into<String>, dataset: Dataset) -> Self {
        Self::with_http(key, dataset, default_http())
    }

    /// Build on a caller-supplied HTTP client (custom timeouts, proxies,
    /// or a session shared across datasets).
    pub fn with_http(key: impl Into<String>, dataset: Dataset, http: HttpClient) -> Self {
        let default_year = dataset.default_year;
        Self {
            key: key.into(),
            dataset,
            default_year,
            base_url: DEFAULT_BASE_URL.into(),
            retry: RetryPolicy::default(),
            http,
            types: Mutex::new(AHashMap::new()),
        }
    }

    /// Override the year used when a call does not pass one.
    pub fn with_year(mut self, year: u32) -> Self {
        self.default_year = year;
        self
    }

    pub fn with_retries(mut self, max_attempts: usize) -> Self {
        self.retry = RetryPolicy { max_attempts };
        self
    }

    /// Point the client at a different API root. Test seam.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn default_year(&self) -> u32 {
        self.default_year
    }

    /// Fetch `fields` for `geo`, splitting the list into requests of at
    /// most [`MAX_FIELDS_PER_QUERY`] columns and merging the results.
    ///
    /// Rows from different chunks are aligned by position, which requires
    /// the API to return rows in the same order for every chunk of the
    /// same geography and year (a hard precondition, not something this
    /// method can detect). Colliding keys (the synthetic geography columns
    /// the API injects into every chunk) take the last chunk's value.
    /// Chunks that disagree on row count truncate the merge to the
    /// shortest.
    pub fn get(
        &self,
        fields: &[&str],
        geo: &GeographySpec,
        year: Option<u32>,
    ) -> Result<Vec<Record>> {
        let year = year.unwrap_or(self.default_year);
        let mut merged: Vec<Record> = Vec::new();
        for (i, chunk) in fields.chunks(MAX_FIELDS_PER_QUERY).enumerate() {
            let rows = self.query(chunk, geo, Some(year))?;
            if i == 0 {
                merged = rows;
                continue;
            }
            if rows.len() != merged.len() {
                tracing::warn!(
                    expected = merged.len(),
                    got = rows.len(),
                    "chunks returned differing row counts; truncating to the shortest"
                );
                merged.truncate(rows.len());
            }
            for (record, extra) in merged.iter_mut().zip(rows) {
                record.extend(extra);
            }
        }
        Ok(merged)
    }

    /// Issue a single request (one HTTP round trip).
    ///
    /// Unlike [`Client::get`] this path does not chunk: more than
    /// [`MAX_FIELDS_PER_QUERY`] fields is an error. A 204 means no
    /// matching rows and yields an empty vec. Transient API-side internal
    /// errors are retried immediately up to the configured attempt count.
    pub fn query(
        &self,
        fields: &[&str],
        geo: &GeographySpec,
        year: Option<u32>,
    ) -> Result<Vec<Record>> {
        if fields.len() > MAX_FIELDS_PER_QUERY {
            return Err(Error::TooManyFields {
                got: fields.len(),
                cap: MAX_FIELDS_PER_QUERY,
            });
        }
        let year = year.unwrap_or(self.default_year);
        let url = self.query_url(fields, geo, year);

        let mut attempt = 0;
        loop {
            attempt += 1;
            let resp = self.http.get(&url).send()?;
            let status = resp.status();
            if status.as_u16() == 204 {
                return Ok(Vec::new());
            }
            let body = resp.text()?;
            if !status.is_success() {
                return Err(Error::Api {
                    status: status.as_u16(),
                    body,
                });
            }
            match serde_json::from_str::<Vec<Vec<Value>>>(&body) {
                Ok(table) => return self.decode(table, year),
                Err(err) => {
                    if body.contains(INVALID_KEY_MARKER) {
                        return Err(Error::InvalidApiKey);
                    }
                    if RetryPolicy::is_transient(&body) {
                        if attempt < self.retry.max_attempts {
                            tracing::debug!(attempt, "transient Census API error; retrying");
                            continue;
                        }
                        return Err(Error::Api { status: 200, body });
                    }
                    return Err(Error::Decode(err.to_string()));
                }
            }
        }
    }

    /// Build the query URL. The key goes last, matching the documented
    /// parameter order.
    fn query_url(&self, fields: &[&str], geo: &GeographySpec, year: u32) -> String {
        let mut url = format!(
            "{}?get={}&for={}",
            self.dataset.query_url(&self.base_url, year),
            enc(&fields.join(",")),
            enc(&geo.target),
        );
        if let Some(within) = &geo.within {
            url.push_str("&in=");
            url.push_str(&enc(within));
        }
        url.push_str("&key=");
        url.push_str(&enc(&self.key));
        url
    }

    /// Turn the raw table (header row first) into field-named records,
    /// coercing each column through its resolved predicate type.
    fn decode(&self, table: Vec<Vec<Value>>, year: u32) -> Result<Vec<Record>> {
        let mut rows = table.into_iter();
        let Some(header) = rows.next() else {
            return Ok(Vec::new());
        };
        let header: Vec<String> = header
            .into_iter()
            .map(|h| match h {
                Value::String(s) => s,
                other => other.to_string(),
            })
            .collect();
        let types: Vec<PredicateType> = header
            .iter()
            .map(|field| self.predicate_type(field, year))
            .collect();

        let mut out = Vec::new();
        for row in rows {
            let mut record = Record::with_capacity(header.len());
            for ((name, ty), cell) in header.iter().zip(&types).zip(row) {
                record.insert(name.clone(), coerce(cell, *ty)?);
            }
            out.push(record);
        }
        Ok(out)
    }

    /// Resolve how `field`'s values must be coerced, fetching the variable
    /// definition once per (field, year) and caching it for the client's
    /// lifetime. Metadata failures fail open to string: a typing miss must
    /// never block the main query.
    pub fn predicate_type(&self, field: &str, year: u32) -> PredicateType {
        let key = (field.to_string(), year);
        {
            let cache = self.types.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(ty) = cache.get(&key) {
                return *ty;
            }
        }
        // The lock is not held across the fetch; a duplicate fetch under
        // concurrent use is harmless.
        let ty = self.fetch_predicate_type(field, year);
        self.types
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, ty);
        ty
    }

    fn fetch_predicate_type(&self, field: &str, year: u32) -> PredicateType {
        let url = self.dataset.variable_url(&self.base_url, year, field);
        let resp = match self.http.get(&url).send() {
            Ok(resp) => resp,
            Err(err) => {
                tracing::debug!(field, year, %err, "variable definition fetch failed; defaulting to string");
                return PredicateType::Str;
            }
        };
        if !resp.status().is_success() {
            tracing::debug!(
                field,
                year,
                status = resp.status().as_u16(),
                "no variable definition; defaulting to string"
            );
            return PredicateType::Str;
        }
        let definition: Value = match resp.json() {
            Ok(v) => v,
            Err(err) => {
                tracing::debug!(field, year, %err, "unreadable variable definition; defaulting to string");
                return PredicateType::Str;
            }
        };
        match definition.get("predicateType").and_then(Value::as_str) {
            Some("fips-for") | Some("fips-in") => PredicateType::Fips,
            Some("int") => PredicateType::IntOrStr,
            Some("float") => PredicateType::Float,
            _ => PredicateType::Str,
        }
    }

    /// Variable catalog for the dataset-year (`variables.json`): name to
    /// definition (label, concept, predicateType).
    pub fn fields(&self, year: Option<u32>) -> Result<serde_json::Map<String, Value>> {
        let year = self.require_year(year, self.dataset.years)?;
        let body = self.get_json(&self.dataset.variables_url(&self.base_url, year))?;
        body.get("variables")
            .and_then(Value::as_object)
            .cloned()
            .ok_or_else(|| Error::Decode("variable catalog missing `variables` object".into()))
    }

    /// Group (table) catalog for the dataset-year (`groups.json`).
    pub fn tables(&self, year: Option<u32>) -> Result<Vec<Value>> {
        let year = self.require_year(year, self.dataset.years)?;
        let body = self.get_json(&self.dataset.groups_url(&self.base_url, year))?;
        body.get("groups")
            .and_then(Value::as_array)
            .cloned()
            .ok_or_else(|| Error::Decode("group catalog missing `groups` array".into()))
    }

    fn get_json(&self, url: &str) -> Result<Value> {
        let resp = self.http.get(url).send()?;
        let status = resp.status();
        let body = resp.text()?;
        if !status.is_success() {
            return Err(Error::Api {
                status: status.as_u16(),
                body,
            });
        }
        serde_json::from_str(&body).map_err(|err| Error::Decode(err.to_string()))
    }

    /// Check the requested year (explicit, else the client default)
    /// against an accessor's supported set before touching the network.
    fn require_year(&self, year: Option<u32>, supported: &[u32]) -> Result<u32> {
        let year = year.unwrap_or(self.default_year);
        if supported.contains(&year) {
            Ok(year)
        } else {
            let mut supported = supported.to_vec();
            supported.sort_unstable();
            Err(Error::UnsupportedYear { year, supported })
        }
    }

    /// Supported years of the dataset from `min` onward, for accessors
    /// the API only serves on newer vintages.
    fn years_from(&self, min: u32) -> Vec<u32> {
        self.dataset
            .years
            .iter()
            .copied()
            .filter(|year| *year >= min)
            .collect()
    }

    // Geography accessors. Each one checks its supported-year set first
    // and fails fast without a network call on a miss.

    /// Data for the entire United States.
    pub fn us(&self, fields: &[&str], year: Option<u32>) -> Result<Vec<Record>> {
        let year = self.require_year(year, self.dataset.years)?;
        self.get(fields, &GeographySpec::us(), Some(year))
    }

    pub fn state(&self, fields: &[&str], state_fips: &str, year: Option<u32>) -> Result<Vec<Record>> {
        let year = self.require_year(year, self.dataset.years)?;
        self.get(fields, &GeographySpec::state(state_fips), Some(year))
    }

    pub fn state_county(
        &self,
        fields: &[&str],
        state_fips: &str,
        county_fips: &str,
        year: Option<u32>,
    ) -> Result<Vec<Record>> {
        let year = self.require_year(year, self.dataset.years)?;
        self.get(
            fields,
            &GeographySpec::state_county(state_fips, county_fips),
            Some(year),
        )
    }

    pub fn state_county_subdivision(
        &self,
        fields: &[&str],
        state_fips: &str,
        county_fips: &str,
        subdiv_fips: &str,
        year: Option<u32>,
    ) -> Result<Vec<Record>> {
        let year = self.require_year(year, &self.years_from(self.dataset.subdivision_from))?;
        self.get(
            fields,
            &GeographySpec::state_county_subdivision(state_fips, county_fips, subdiv_fips),
            Some(year),
        )
    }

    pub fn state_county_tract(
        &self,
        fields: &[&str],
        state_fips: &str,
        county_fips: &str,
        tract: &str,
        year: Option<u32>,
    ) -> Result<Vec<Record>> {
        let year = self.require_year(year, self.dataset.years)?;
        self.get(
            fields,
            &GeographySpec::state_county_tract(state_fips, county_fips, tract),
            Some(year),
        )
    }

    pub fn state_county_blockgroup(
        &self,
        fields: &[&str],
        state_fips: &str,
        county_fips: &str,
        blockgroup: &str,
        tract: Option<&str>,
        year: Option<u32>,
    ) -> Result<Vec<Record>> {
        let year = self.require_year(year, self.dataset.years)?;
        self.get(
            fields,
            &GeographySpec::state_county_blockgroup(state_fips, county_fips, blockgroup, tract),
            Some(year),
        )
    }

    pub fn state_place(
        &self,
        fields: &[&str],
        state_fips: &str,
        place: &str,
        year: Option<u32>,
    ) -> Result<Vec<Record>> {
        let year = self.require_year(year, self.dataset.years)?;
        self.get(
            fields,
            &GeographySpec::state_place(state_fips, place),
            Some(year),
        )
    }

    pub fn state_congressional_district(
        &self,
        fields: &[&str],
        state_fips: &str,
        district: &str,
        year: Option<u32>,
    ) -> Result<Vec<Record>> {
        let year = self.require_year(year, self.dataset.years)?;
        self.get(
            fields,
            &GeographySpec::state_congressional_district(state_fips, district),
            Some(year),
        )
    }

    /// State legislative districts only exist in 2011-and-later vintages.
    pub fn state_legislative_district_upper(
        &self,
        fields: &[&str],
        state_fips: &str,
        district: &str,
        year: Option<u32>,
    ) -> Result<Vec<Record>> {
        let year = self.require_year(year, &self.years_from(2011))?;
        self.get(
            fields,
            &GeographySpec::state_legislative_district_upper(state_fips, district),
            Some(year),
        )
    }

    pub fn state_legislative_district_lower(
        &self,
        fields: &[&str],
        state_fips: &str,
        district: &str,
        year: Option<u32>,
    ) -> Result<Vec<Record>> {
        let year = self.require_year(year, &self.years_from(2011))?;
        self.get(
            fields,
            &GeographySpec::state_legislative_district_lower(state_fips, district),
            Some(year),
        )
    }

    /// Five-digit ZIP code tabulation area, nationwide. ZCTAs first appear
    /// in the 2011 ACS and 2010 decennial vintages.
    pub fn zipcode(&self, fields: &[&str], zcta: &str, year: Option<u32>) -> Result<Vec<Record>> {
        let year = self.require_year(year, &self.years_from(self.dataset.zcta_from))?;
        self.get(fields, &GeographySpec::zipcode(zcta), Some(year))
    }

    pub fn state_zipcode(
        &self,
        fields: &[&str],
        state_fips: &str,
        zcta: &str,
        year: Option<u32>,
    ) -> Result<Vec<Record>> {
        let year = self.require_year(year, &self.years_from(self.dataset.zcta_from))?;
        self.get(
            fields,
            &GeographySpec::state_zipcode(state_fips, zcta),
            Some(year),
        )
    }

    /// Metro/micropolitan statistical areas appear from the 2010 vintages.
    pub fn state_msa(
        &self,
        fields: &[&str],
        state_fips: &str,
        msa: &str,
        year: Option<u32>,
    ) -> Result<Vec<Record>> {
        let year = self.require_year(year, &self.years_from(2010))?;
        self.get(fields, &GeographySpec::state_msa(state_fips, msa), Some(year))
    }

    pub fn state_csa(
        &self,
        fields: &[&str],
        state_fips: &str,
        csa: &str,
        year: Option<u32>,
    ) -> Result<Vec<Record>> {
        let year = self.require_year(year, &self.years_from(2010))?;
        self.get(fields, &GeographySpec::state_csa(state_fips, csa), Some(year))
    }

    /// Query each sub-area produced by `source`, pairing every feature
    /// with its record (empty when the API returns no row for that area).
    /// Checks the year before enumerating any areas.
    pub fn records_for_areas<S: AreaSource>(
        &self,
        fields: &[&str],
        source: &mut S,
        year: Option<u32>,
    ) -> Result<Vec<(Feature, Record)>> {
        let year = self.require_year(year, self.dataset.years)?;
        let mut out = Vec::new();
        for feature in source.areas()? {
            let rows = self.query(fields, &feature.to_geography(), Some(year))?;
            let record = rows.into_iter().next().unwrap_or_default();
            out.push((feature, record));
        }
        Ok(out)
    }
}

/// Coerce one cell. Nulls pass through; values the API already typed as
/// numbers do too.
fn coerce(cell: Value, ty: PredicateType) -> Result<Value> {
    let s = match cell {
        Value::Null => return Ok(Value::Null),
        Value::String(s) => s,
        other => return Ok(other),
    };
    match ty {
        PredicateType::Str | PredicateType::Fips => Ok(Value::String(s)),
        PredicateType::IntOrStr => Ok(parse_number(&s).unwrap_or(Value::String(s))),
        PredicateType::Float => parse_number(&s)
            .ok_or_else(|| Error::Decode(format!("expected a numeric value, got {s:?}"))),
    }
}

fn parse_number(s: &str) -> Option<Value> {
    s.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
}

/// One client per built-in dataset, sharing a single HTTP session.
/// The usual entry point.
///
/// ```no_run
/// # use census_api::Census;
/// let census = Census::new("my-api-key");
/// let rows = census.acs5.state(&["NAME", "B25034_010E"], "24", None)?;
/// # Ok::<(), anyhow::Error>(())
/// ```
#[derive(Debug)]
pub struct Census {
    pub acs5: Client,
    pub acs1: Client,
    pub acs1dp: Client,
    pub sf1: Client,
    pub sf3: Client,
    pub pl: Client,
}

impl Census {
    pub fn new(key: impl Into<String>) -> Self {
        Self::with_http(key, default_http())
    }

    pub fn with_http(key: impl Into<String>, http: HttpClient) -> Self {
        let key = key.into();
        let make = |ds: Dataset| Client::with_http(key.clone(), ds, http.clone());
        Self {
            acs5: make(dataset::ACS5),
            acs1: make(dataset::ACS1),
            acs1dp: make(dataset::ACS1DP),
            sf1: make(dataset::SF1),
            sf3: make(dataset::SF3),
            pl: make(dataset::PL),
        }
    }

    /// Set the default year on every dataset client at once.
    pub fn with_year(mut self, year: u32) -> Self {
        self.acs5 = self.acs5.with_year(year);
        self.acs1 = self.acs1.with_year(year);
        self.acs1dp = self.acs1dp.with_year(year);
        self.sf1 = self.sf1.with_year(year);
        self.sf3 = self.sf3.with_year(year);
        self.pl = self.pl.with_year(year);
        self
    }
}
