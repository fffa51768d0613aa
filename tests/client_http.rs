//! Client tests against a local mock of the Census data API.
//!
//! The client is blocking, so the wiremock server runs on a hand-built
//! tokio runtime while the requests themselves stay on the test thread.

use census_api::{AreaSource, Client, Error, Feature, GeographySpec, dataset};
use serde_json::{Value, json};
use tokio::runtime::Runtime;
use wiremock::matchers::{method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap()
}

fn acs5_client(server: &MockServer) -> Client {
    Client::new("KEY", dataset::ACS5).with_base_url(server.uri())
}

/// 404 every variable-definition lookup; the resolver fails open to string.
fn mount_no_metadata(rt: &Runtime, server: &MockServer) {
    rt.block_on(
        Mock::given(method("GET"))
            .and(path_regex(r"^/2022/acs/acs5/variables/.+\.json$"))
            .respond_with(ResponseTemplate::new(404))
            .mount(server),
    );
}

/// Tabular body: the given field names plus the synthetic `state` column,
/// and one data row of "1"s with `state_value` in the state column.
fn table_body(fields: &[String], state_value: &str) -> String {
    let mut header: Vec<Value> = fields.iter().map(|f| json!(f)).collect();
    header.push(json!("state"));
    let mut row: Vec<Value> = fields.iter().map(|_| json!("1")).collect();
    row.push(json!(state_value));
    serde_json::to_string(&vec![header, row]).unwrap()
}

#[test]
fn fifty_or_fewer_fields_is_a_single_request() {
    let rt = runtime();
    let server = rt.block_on(MockServer::start());
    mount_no_metadata(&rt, &server);

    let fields: Vec<String> = (1..=50).map(|i| format!("F{i:03}")).collect();
    rt.block_on(
        Mock::given(method("GET"))
            .and(path("/2022/acs/acs5"))
            .respond_with(ResponseTemplate::new(200).set_body_string(table_body(&fields, "24")))
            .expect(1)
            .mount(&server),
    );

    let refs: Vec<&str> = fields.iter().map(String::as_str).collect();
    let rows = acs5_client(&server)
        .get(&refs, &GeographySpec::us(), None)
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].len(), 51);

    rt.block_on(server.verify());
}

#[test]
fn sixty_fields_chunk_into_two_requests_and_merge() {
    let rt = runtime();
    let server = rt.block_on(MockServer::start());
    mount_no_metadata(&rt, &server);

    let fields: Vec<String> = (1..=60).map(|i| format!("F{i:03}")).collect();
    rt.block_on(
        Mock::given(method("GET"))
            .and(path("/2022/acs/acs5"))
            .and(query_param("get", fields[..50].join(",")))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(table_body(&fields[..50], "24")),
            )
            .expect(1)
            .mount(&server),
    );
    rt.block_on(
        Mock::given(method("GET"))
            .and(path("/2022/acs/acs5"))
            .and(query_param("get", fields[50..].join(",")))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(table_body(&fields[50..], "99")),
            )
            .expect(1)
            .mount(&server),
    );

    let refs: Vec<&str> = fields.iter().map(String::as_str).collect();
    let rows = acs5_client(&server)
        .get(&refs, &GeographySpec::us(), None)
        .unwrap();

    // one merged record carrying the union of both chunks' columns
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].len(), 61);
    for field in &fields {
        assert!(rows[0].contains_key(field.as_str()), "missing {field}");
    }
    // the synthetic geography column collides across chunks; last chunk wins
    assert_eq!(rows[0]["state"], json!("99"));

    rt.block_on(server.verify());
}

#[test]
fn more_than_fifty_fields_is_an_error_on_the_single_request_path() {
    let fields: Vec<String> = (1..=51).map(|i| format!("F{i:03}")).collect();
    let refs: Vec<&str> = fields.iter().map(String::as_str).collect();
    let err = Client::new("KEY", dataset::ACS5)
        .query(&refs, &GeographySpec::us(), None)
        .unwrap_err();
    assert!(matches!(err, Error::TooManyFields { got: 51, cap: 50 }));
}

#[test]
fn unsupported_year_makes_no_request() {
    let rt = runtime();
    let server = rt.block_on(MockServer::start());

    let client = acs5_client(&server).with_year(1999);
    let err = client.state(&["NAME"], "24", None).unwrap_err();
    assert!(matches!(err, Error::UnsupportedYear { year: 1999, .. }));

    let requests = rt.block_on(server.received_requests()).unwrap();
    assert!(requests.is_empty());
}

#[test]
fn zcta_years_before_2011_make_no_request() {
    let rt = runtime();
    let server = rt.block_on(MockServer::start());

    // 2009 is a published ACS5 year, but ZCTAs only exist from 2011.
    let err = acs5_client(&server)
        .zipcode(&["NAME"], "20877", Some(2009))
        .unwrap_err();
    match err {
        Error::UnsupportedYear { year, supported } => {
            assert_eq!(year, 2009);
            assert_eq!(supported[0], 2011);
        }
        other => panic!("expected UnsupportedYear, got {other:?}"),
    }

    let requests = rt.block_on(server.received_requests()).unwrap();
    assert!(requests.is_empty());
}

#[test]
fn no_content_yields_empty_list() {
    let rt = runtime();
    let server = rt.block_on(MockServer::start());
    rt.block_on(
        Mock::given(method("GET"))
            .and(path("/2022/acs/acs5"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server),
    );

    let rows = acs5_client(&server)
        .query(&["NAME"], &GeographySpec::zipcode("20877"), None)
        .unwrap();
    assert!(rows.is_empty());
}

#[test]
fn invalid_key_marker_beats_generic_decode_error() {
    let rt = runtime();
    let server = rt.block_on(MockServer::start());
    rt.block_on(
        Mock::given(method("GET"))
            .and(path("/2022/acs/acs5"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<html><head><title>Invalid Key</title></head><body>...</body></html>",
            ))
            .mount(&server),
    );

    let err = acs5_client(&server)
        .query(&["NAME"], &GeographySpec::us(), None)
        .unwrap_err();
    assert!(matches!(err, Error::InvalidApiKey));
}

#[test]
fn malformed_body_without_marker_is_a_decode_error() {
    let rt = runtime();
    let server = rt.block_on(MockServer::start());
    rt.block_on(
        Mock::given(method("GET"))
            .and(path("/2022/acs/acs5"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<html>service temporarily unavailable</html>"),
            )
            .mount(&server),
    );

    let err = acs5_client(&server)
        .query(&["NAME"], &GeographySpec::us(), None)
        .unwrap_err();
    assert!(matches!(err, Error::Decode(_)));
}

#[test]
fn non_success_status_carries_the_body() {
    let rt = runtime();
    let server = rt.block_on(MockServer::start());
    rt.block_on(
        Mock::given(method("GET"))
            .and(path("/2022/acs/acs5"))
            .respond_with(ResponseTemplate::new(400).set_body_string("error: unknown variable"))
            .mount(&server),
    );

    let err = acs5_client(&server)
        .query(&["NOPE"], &GeographySpec::us(), None)
        .unwrap_err();
    match err {
        Error::Api { status, body } => {
            assert_eq!(status, 400);
            assert!(body.contains("unknown variable"));
        }
        other => panic!("expected Api error, got {other:?}"),
    }
}

const TRANSIENT_BODY: &str = "There was an error while running your query.  \
    We've logged the error and we'll correct it ASAP.  Sorry for the inconvenience.";

#[test]
fn transient_server_errors_are_retried() {
    let rt = runtime();
    let server = rt.block_on(MockServer::start());
    mount_no_metadata(&rt, &server);

    // First call serves the transient apology, the retry succeeds.
    rt.block_on(
        Mock::given(method("GET"))
            .and(path("/2022/acs/acs5"))
            .respond_with(ResponseTemplate::new(200).set_body_string(TRANSIENT_BODY))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server),
    );
    rt.block_on(
        Mock::given(method("GET"))
            .and(path("/2022/acs/acs5"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(table_body(&["NAME".into()], "24")),
            )
            .expect(1)
            .mount(&server),
    );

    let rows = acs5_client(&server)
        .query(&["NAME"], &GeographySpec::us(), None)
        .unwrap();
    assert_eq!(rows.len(), 1);

    rt.block_on(server.verify());
}

#[test]
fn transient_errors_surface_after_retries_exhaust() {
    let rt = runtime();
    let server = rt.block_on(MockServer::start());
    rt.block_on(
        Mock::given(method("GET"))
            .and(path("/2022/acs/acs5"))
            .respond_with(ResponseTemplate::new(200).set_body_string(TRANSIENT_BODY))
            .expect(2)
            .mount(&server),
    );

    let err = acs5_client(&server)
        .with_retries(2)
        .query(&["NAME"], &GeographySpec::us(), None)
        .unwrap_err();
    assert!(matches!(err, Error::Api { status: 200, .. }));

    rt.block_on(server.verify());
}

#[test]
fn predicate_types_are_fetched_once_and_applied() {
    let rt = runtime();
    let server = rt.block_on(MockServer::start());

    for (field, predicate) in [
        ("NAME", "string"),
        ("B01001_001E", "int"),
        ("state", "fips-for"),
    ] {
        rt.block_on(
            Mock::given(method("GET"))
                .and(path(format!("/2022/acs/acs5/variables/{field}.json")))
                .respond_with(
                    ResponseTemplate::new(200).set_body_json(json!({ "predicateType": predicate })),
                )
                .expect(1)
                .mount(&server),
        );
    }
    let body = serde_json::to_string(&json!([
        ["NAME", "B01001_001E", "state"],
        ["Maryland", "6177224", "24"],
    ]))
    .unwrap();
    rt.block_on(
        Mock::given(method("GET"))
            .and(path("/2022/acs/acs5"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .expect(2)
            .mount(&server),
    );

    let client = acs5_client(&server);
    for _ in 0..2 {
        let rows = client
            .get(&["NAME", "B01001_001E"], &GeographySpec::state("24"), None)
            .unwrap();
        assert_eq!(rows[0]["NAME"], json!("Maryland"));
        assert_eq!(rows[0]["B01001_001E"], json!(6177224.0));
        assert_eq!(rows[0]["state"], json!("24"));
    }

    // exactly one metadata request per (field, year); the second query
    // was served entirely from the cache
    rt.block_on(server.verify());
}

#[test]
fn null_cells_stay_null() {
    let rt = runtime();
    let server = rt.block_on(MockServer::start());
    mount_no_metadata(&rt, &server);

    let body = serde_json::to_string(&json!([
        ["B19013_001E", "state"],
        [null, "24"],
    ]))
    .unwrap();
    rt.block_on(
        Mock::given(method("GET"))
            .and(path("/2022/acs/acs5"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server),
    );

    let rows = acs5_client(&server)
        .query(&["B19013_001E"], &GeographySpec::state("24"), None)
        .unwrap();
    assert_eq!(rows[0]["B19013_001E"], Value::Null);
}

struct FixedAreas(Vec<Feature>);

impl AreaSource for FixedAreas {
    fn areas(&mut self) -> census_api::Result<Vec<Feature>> {
        Ok(self.0.clone())
    }
}

#[test]
fn records_for_areas_pairs_each_feature_with_its_row() {
    let rt = runtime();
    let server = rt.block_on(MockServer::start());
    mount_no_metadata(&rt, &server);

    rt.block_on(
        Mock::given(method("GET"))
            .and(path("/2022/acs/acs5"))
            .and(query_param("for", "tract:700704"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(table_body(&["NAME".into()], "24")),
            )
            .mount(&server),
    );
    rt.block_on(
        Mock::given(method("GET"))
            .and(path("/2022/acs/acs5"))
            .and(query_param("for", "tract:000000"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server),
    );

    let feature = |tract: &str| Feature {
        state: "24".into(),
        county: "031".into(),
        tract: tract.into(),
        block_group: None,
    };
    let mut source = FixedAreas(vec![feature("700704"), feature("000000")]);

    let pairs = acs5_client(&server)
        .records_for_areas(&["NAME"], &mut source, None)
        .unwrap();
    assert_eq!(pairs.len(), 2);
    assert_eq!(pairs[0].1["NAME"], json!("1"));
    assert!(pairs[1].1.is_empty());
}

#[test]
fn area_queries_check_the_year_before_enumerating() {
    let rt = runtime();
    let server = rt.block_on(MockServer::start());

    let mut source = FixedAreas(vec![Feature {
        state: "24".into(),
        county: "031".into(),
        tract: "700704".into(),
        block_group: None,
    }]);
    let err = acs5_client(&server)
        .records_for_areas(&["NAME"], &mut source, Some(1999))
        .unwrap_err();
    assert!(matches!(err, Error::UnsupportedYear { year: 1999, .. }));

    let requests = rt.block_on(server.received_requests()).unwrap();
    assert!(requests.is_empty());
}
