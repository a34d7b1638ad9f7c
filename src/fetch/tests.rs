use std::sync::Mutex;

use anyhow::Result;

use super::prometheus::{parse_query_response, parse_sample_value};
use super::{LabeledSource, Sample, SampleFetcher, SampleSource, with_target_label};
use crate::model::{Direction, MetricSpec};

struct RecordingFetcher {
    queries: Mutex<Vec<String>>,
}

impl SampleFetcher for RecordingFetcher {
    fn fetch(&self, query: &str) -> Result<Sample> {
        self.queries
            .lock()
            .expect("query log lock")
            .push(query.to_string());
        Ok(Sample::present(1.0))
    }
}

#[test]
fn target_label_is_injected_into_existing_matcher() {
    let query = with_target_label(
        r#"rate(container_cpu_usage_seconds_total{image!=""}[1m])"#,
        "container",
        "web-rootless",
    );
    assert_eq!(
        query,
        r#"rate(container_cpu_usage_seconds_total{image!="",container="web-rootless"}[1m])"#
    );
}

#[test]
fn target_label_is_appended_when_query_has_no_matcher() {
    let query = with_target_label("container_memory_usage_bytes", "container", "web-rootful");
    assert_eq!(query, r#"container_memory_usage_bytes{container="web-rootful"}"#);
}

#[test]
fn target_label_fills_empty_matcher_without_leading_comma() {
    let query = with_target_label("container_memory_usage_bytes{}", "name", "db");
    assert_eq!(query, r#"container_memory_usage_bytes{name="db"}"#);
}

#[test]
fn target_label_uses_last_closing_brace() {
    let query = with_target_label(
        r#"sum(a{job="x"}) / sum(b{job="x"})"#,
        "container",
        "c1",
    );
    assert_eq!(query, r#"sum(a{job="x"}) / sum(b{job="x",container="c1"})"#);
}

#[test]
fn vector_response_yields_first_sample() {
    let body = br#"{
        "status": "success",
        "data": {
            "resultType": "vector",
            "result": [
                {"metric": {"container": "a"}, "value": [1712345678.123, "0.42"]},
                {"metric": {"container": "b"}, "value": [1712345678.123, "9.99"]}
            ]
        }
    }"#;

    let sample = parse_query_response(body).expect("vector response should parse");
    assert_eq!(sample, Sample::present(0.42));
}

#[test]
fn empty_vector_is_missing_not_an_error() {
    let body = br#"{"status":"success","data":{"resultType":"vector","result":[]}}"#;
    let sample = parse_query_response(body).expect("empty vector should parse");
    assert_eq!(sample, Sample::missing());
}

#[test]
fn scalar_response_is_supported() {
    let body = br#"{"status":"success","data":{"resultType":"scalar","result":[1712345678,"12"]}}"#;
    let sample = parse_query_response(body).expect("scalar response should parse");
    assert_eq!(sample, Sample::present(12.0));
}

#[test]
fn error_status_is_fatal() {
    let body = br#"{"status":"error","errorType":"bad_data","error":"parse error at char 4"}"#;
    let error = parse_query_response(body).expect_err("error status should fail");
    let message = error.to_string();
    assert!(message.contains("bad_data"), "unexpected error: {message}");
    assert!(message.contains("parse error"), "unexpected error: {message}");
}

#[test]
fn non_json_body_is_fatal() {
    assert!(parse_query_response(b"<html>502</html>").is_err());
}

#[test]
fn matrix_response_is_rejected() {
    let body = br#"{"status":"success","data":{"resultType":"matrix","result":[
        {"metric":{},"values":[[1700000000,"1"],[1700000015,"2"]]}
    ]}}"#;
    let error = parse_query_response(body).expect_err("range vectors are not samples");
    let message = error.to_string();
    assert!(message.contains("1 series"), "unexpected error: {message}");
}

#[test]
fn string_response_is_rejected_with_its_value() {
    let body =
        br#"{"status":"success","data":{"resultType":"string","result":[1700000000,"hello"]}}"#;
    let error = parse_query_response(body).expect_err("strings are not samples");
    let message = error.to_string();
    assert!(message.contains("\"hello\""), "unexpected error: {message}");
}

#[test]
fn unparseable_and_non_finite_values_are_missing() {
    assert_eq!(parse_sample_value("12.5"), Sample::present(12.5));
    assert_eq!(parse_sample_value("not-a-number"), Sample::missing());
    assert_eq!(parse_sample_value("NaN"), Sample::missing());
    assert_eq!(parse_sample_value("inf"), Sample::missing());
}

#[test]
fn labeled_source_queries_each_target_separately() {
    let fetcher = RecordingFetcher {
        queries: Mutex::new(Vec::new()),
    };
    let source = LabeledSource::new(&fetcher, "container");
    let spec = MetricSpec {
        name: "mem".to_string(),
        query_template: "container_memory_usage_bytes".to_string(),
        weight: 1.0,
        direction: Direction::Lower,
    };

    source.sample(&spec, "rl").expect("rootless sample");
    source.sample(&spec, "rf").expect("rootful sample");

    let queries = fetcher.queries.lock().expect("query log lock");
    assert_eq!(
        *queries,
        vec![
            r#"container_memory_usage_bytes{container="rl"}"#.to_string(),
            r#"container_memory_usage_bytes{container="rf"}"#.to_string(),
        ]
    );
}
