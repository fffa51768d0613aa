//! Dataset descriptors for the Census data API.
//!
//! A [`Dataset`] bundles the per-vintage facts a query needs: the API
//! path fragment (which changes shape across vintages, `sf1` before the
//! 2010 decennial and `dec/sf1` from it onward), the default year, and
//! the supported-year span. The built-in descriptors cover the datasets
//! the [`Census`](crate::Census) aggregator exposes.

/// Root of the Census data API.
pub const DEFAULT_BASE_URL: &str = "https://api.census.gov/data";

/// Fixed attributes of one dataset (ACS 5-year, SF1, ...).
#[derive(Debug, Clone)]
pub struct Dataset {
    /// Short name, also the field name on the `Census` aggregator.
    pub name: &'static str,
    /// Year used when a call does not pass one explicitly.
    pub default_year: u32,
    /// Years the dataset is published for. Individual geography accessors
    /// may support a narrower set.
    pub years: &'static [u32],
    /// First vintage carrying ZCTA predicates. Earlier years, and datasets
    /// whose span ends before this, reject ZCTA queries before any request.
    pub zcta_from: u32,
    /// First vintage carrying county-subdivision predicates.
    pub subdivision_from: u32,
    /// `(first_year, path)` pairs, descending by year. The path for a
    /// vintage is the first entry whose year is not after the requested one.
    paths: &'static [(u32, &'static str)],
}

impl Dataset {
    /// API path fragment for `year`.
    pub fn path(&self, year: u32) -> &'static str {
        self.paths
            .iter()
            .find(|(from, _)| year >= *from)
            .map(|(_, path)| *path)
            .unwrap_or(self.paths[self.paths.len() - 1].1)
    }

    pub fn supports(&self, year: u32) -> bool {
        self.years.contains(&year)
    }

    /// Query endpoint for `year`, e.g. `{base}/2022/acs/acs5`.
    pub fn query_url(&self, base: &str, year: u32) -> String {
        format!("{}/{}/{}", base, year, self.path(year))
    }

    /// Variable catalog endpoint (`variables.json`) for `year`.
    pub fn variables_url(&self, base: &str, year: u32) -> String {
        format!("{}/variables.json", self.query_url(base, year))
    }

    /// Per-variable definition endpoint (`variables/{field}.json`).
    pub fn variable_url(&self, base: &str, year: u32, field: &str) -> String {
        format!("{}/variables/{}.json", self.query_url(base, year), field)
    }

    /// Group (table) catalog endpoint (`groups.json`) for `year`.
    pub fn groups_url(&self, base: &str, year: u32) -> String {
        format!("{}/groups.json", self.query_url(base, year))
    }
}

/// American Community Survey, 5-year estimates.
pub const ACS5: Dataset = Dataset {
    name: "acs5",
    default_year: 2022,
    years: &[
        2009, 2010, 2011, 2012, 2013, 2014, 2015, 2016, 2017, 2018, 2019, 2020, 2021, 2022,
    ],
    zcta_from: 2011,
    subdivision_from: 2009,
    paths: &[(2010, "acs/acs5"), (2009, "acs5")],
};

/// American Community Survey, 1-year estimates. Not published for 2020.
pub const ACS1: Dataset = Dataset {
    name: "acs1",
    default_year: 2022,
    years: &[2011, 2012, 2013, 2014, 2015, 2016, 2017, 2018, 2019, 2021, 2022],
    zcta_from: 2011,
    subdivision_from: 2011,
    paths: &[(2013, "acs/acs1"), (2011, "acs1")],
};

/// American Community Survey, 1-year data profiles.
pub const ACS1DP: Dataset = Dataset {
    name: "acs1dp",
    default_year: 2022,
    years: &[2012, 2013, 2014, 2015, 2016, 2017, 2018, 2019, 2021, 2022],
    zcta_from: 2012,
    subdivision_from: 2012,
    paths: &[(2013, "acs/acs1/profile"), (2012, "acs1/profile")],
};

/// Decennial census, Summary File 1.
pub const SF1: Dataset = Dataset {
    name: "sf1",
    default_year: 2010,
    years: &[1990, 2000, 2010],
    zcta_from: 2010,
    subdivision_from: 2010,
    paths: &[(2010, "dec/sf1"), (1990, "sf1")],
};

/// Decennial census, Summary File 3 (long form; discontinued after 2000).
pub const SF3: Dataset = Dataset {
    name: "sf3",
    default_year: 2000,
    years: &[1990, 2000],
    zcta_from: 2010,
    subdivision_from: 2010,
    paths: &[(2000, "dec/sf3"), (1990, "sf3")],
};

/// Decennial census redistricting data (P.L. 94-171).
pub const PL: Dataset = Dataset {
    name: "pl",
    default_year: 2020,
    years: &[2000, 2010, 2020],
    zcta_from: 2020,
    subdivision_from: 2010,
    paths: &[(2000, "dec/pl")],
};
