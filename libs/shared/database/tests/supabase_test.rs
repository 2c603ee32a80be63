use assert_matches::assert_matches;
use reqwest::Method;
use serde_json::{json, Value};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use shared_config::AppConfig;
use shared_database::{DatabaseError, SupabaseClient};

fn config_for(server: &MockServer) -> AppConfig {
    AppConfig {
        supabase_url: server.uri(),
        supabase_anon_key: "test-anon-key".to_string(),
        supabase_service_role_key: "test-service-key".to_string(),
        supabase_jwt_secret: "test-secret".to_string(),
        ..AppConfig::default()
    }
}

#[tokio::test]
async fn test_request_sends_service_role_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/clinics"))
        .and(header("apikey", "test-anon-key"))
        .and(header("authorization", "Bearer test-service-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 1}])))
        .expect(1)
        .mount(&server)
        .await;

    let client = SupabaseClient::new(&config_for(&server));
    let rows: Vec<Value> = client
        .request(Method::GET, "/rest/v1/clinics", None, None)
        .await
        .unwrap();

    assert_eq!(rows.len(), 1);
}

#[tokio::test]
async fn test_unique_violation_maps_to_conflict() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "code": "23505",
            "message": "duplicate key value violates unique constraint \"appointments_active_slot_key\""
        })))
        .mount(&server)
        .await;

    let client = SupabaseClient::new(&config_for(&server));
    let result: Result<Vec<Value>, _> = client
        .request_with_headers(
            Method::POST,
            "/rest/v1/appointments",
            None,
            Some(json!({"clinic_id": "x"})),
            Some(SupabaseClient::representation_headers()),
        )
        .await;

    let err = result.unwrap_err();
    assert!(err.is_conflict());
}

#[tokio::test]
async fn test_other_statuses_map_to_typed_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_string("nope"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/broken"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let client = SupabaseClient::new(&config_for(&server));

    let missing: Result<Value, _> = client.request(Method::GET, "/rest/v1/missing", None, None).await;
    assert_matches!(missing, Err(DatabaseError::NotFound(_)));

    let broken: Result<Value, _> = client.request(Method::GET, "/rest/v1/broken", None, None).await;
    assert_matches!(broken, Err(DatabaseError::Api { status: 500, .. }));
}
