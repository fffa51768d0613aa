//! Geography predicates for the API's `for=`/`in=` query parameters.
//!
//! A [`GeographySpec`] names the target geography level plus identifier
//! (`for`) and, where the level is nested, its containing levels (`in`).
//! Constructors are pure template substitution; identifiers are not
//! validated here, so a malformed FIPS code surfaces later as an API error.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Wildcard identifier accepted at every geography level.
pub const ALL: &str = "*";

/// A `for`/`in` predicate pair identifying which rows to return.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeographySpec {
    /// The `for=` predicate: target level and identifier, e.g. `county:031`.
    pub target: String,
    /// The `in=` predicate: space-joined containing levels, e.g. `state:24`.
    pub within: Option<String>,
}

impl GeographySpec {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            within: None,
        }
    }

    pub fn contained(target: impl Into<String>, within: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            within: Some(within.into()),
        }
    }

    /// The entire United States.
    pub fn us() -> Self {
        Self::new("us:1")
    }

    pub fn state(state_fips: &str) -> Self {
        Self::new(format!("state:{state_fips}"))
    }

    pub fn state_county(state_fips: &str, county_fips: &str) -> Self {
        Self::contained(format!("county:{county_fips}"), format!("state:{state_fips}"))
    }

    pub fn state_county_subdivision(
        state_fips: &str,
        county_fips: &str,
        subdiv_fips: &str,
    ) -> Self {
        Self::contained(
            format!("county subdivision:{subdiv_fips}"),
            format!("state:{state_fips} county:{county_fips}"),
        )
    }

    pub fn state_county_tract(state_fips: &str, county_fips: &str, tract: &str) -> Self {
        Self::contained(
            format!("tract:{tract}"),
            format!("state:{state_fips} county:{county_fips}"),
        )
    }

    /// Block group within a county. Pass the tract where known; the API
    /// accepts a county-wide block group predicate without it.
    pub fn state_county_blockgroup(
        state_fips: &str,
        county_fips: &str,
        blockgroup: &str,
        tract: Option<&str>,
    ) -> Self {
        let mut within = format!("state:{state_fips} county:{county_fips}");
        if let Some(tract) = tract {
            within.push_str(&format!(" tract:{tract}"));
        }
        Self::contained(format!("block group:{blockgroup}"), within)
    }

    pub fn state_place(state_fips: &str, place: &str) -> Self {
        Self::contained(format!("place:{place}"), format!("state:{state_fips}"))
    }

    pub fn state_congressional_district(state_fips: &str, district: &str) -> Self {
        Self::contained(
            format!("congressional district:{district}"),
            format!("state:{state_fips}"),
        )
    }

    pub fn state_legislative_district_upper(state_fips: &str, district: &str) -> Self {
        Self::contained(
            format!("state legislative district (upper chamber):{district}"),
            format!("state:{state_fips}"),
        )
    }

    pub fn state_legislative_district_lower(state_fips: &str, district: &str) -> Self {
        Self::contained(
            format!("state legislative district (lower chamber):{district}"),
            format!("state:{state_fips}"),
        )
    }

    /// Five-digit ZIP code tabulation area, nationwide.
    pub fn zipcode(zcta: &str) -> Self {
        Self::new(format!("zip code tabulation area:{zcta}"))
    }

    pub fn state_zipcode(state_fips: &str, zcta: &str) -> Self {
        Self::contained(
            format!("zip code tabulation area:{zcta}"),
            format!("state:{state_fips}"),
        )
    }

    pub fn state_msa(state_fips: &str, msa: &str) -> Self {
        Self::contained(
            format!("metropolitan statistical area/micropolitan statistical area:{msa}"),
            format!("state:{state_fips}"),
        )
    }

    pub fn state_csa(state_fips: &str, csa: &str) -> Self {
        Self::contained(
            format!("combined statistical area:{csa}"),
            format!("state:{state_fips}"),
        )
    }
}

/// Geography identifiers for one sub-area yielded by a polygon
/// intersection source (a tract or block group within an arbitrary shape).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feature {
    pub state: String,
    pub county: String,
    pub tract: String,
    pub block_group: Option<String>,
}

impl Feature {
    /// Geography predicate addressing this feature's own level.
    pub fn to_geography(&self) -> GeographySpec {
        match &self.block_group {
            Some(bg) => GeographySpec::contained(
                format!("block group:{bg}"),
                format!(
                    "state:{} county:{} tract:{}",
                    self.state, self.county, self.tract
                ),
            ),
            None => GeographySpec::state_county_tract(&self.state, &self.county, &self.tract),
        }
    }
}

/// A source of sub-areas intersecting some polygon.
///
/// Implementations wrap a paginated feature dump (e.g. a TIGERweb layer)
/// filtered to features whose intersection with the polygon exceeds 10%
/// of the feature's own area. Enumeration restarts from scratch on every
/// call; there is no mid-stream resumption. The intersection machinery
/// itself lives outside this crate; the client only consumes the trait
/// via [`Client::records_for_areas`](crate::Client::records_for_areas).
pub trait AreaSource {
    fn areas(&mut self) -> Result<Vec<Feature>>;
}
