use std::sync::Arc;

use axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use clinic_cell::handlers::ClinicState;
use clinic_cell::router::clinic_routes;
use clinic_cell::{CatalogService, CatalogStore, InMemoryCatalogStore, SupabaseCatalogStore};
use shared_database::SupabaseClient;
use shared_utils::test_utils::{JwtTestUtils, TestConfig, TestUser};

fn app(config: &TestConfig) -> Router {
    let state = Arc::new(ClinicState {
        config: config.to_arc(),
        catalog: CatalogService::new(Arc::new(InMemoryCatalogStore::new())),
    });
    clinic_routes(state)
}

fn json_request(method: &str, uri: &str, token: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("Authorization", token)
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn read_json(response: axum::response::Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn clinic_body() -> Value {
    json!({
        "name": "Clinica Centro",
        "open_time": "09:00",
        "close_time": "18:00",
        "working_days": [1, 2, 3, 4, 5],
        "timezone": "America/Sao_Paulo",
        "utc_offset_minutes": -180
    })
}

#[tokio::test]
async fn test_admin_creates_clinic_and_service() {
    let config = TestConfig::default();
    let app = app(&config);
    let admin = JwtTestUtils::bearer(&TestUser::admin("admin@clinic.test"), &config.jwt_secret);

    let response = app.clone()
        .oneshot(json_request("POST", "/", &admin, clinic_body()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let clinic = read_json(response).await;
    assert_eq!(clinic["open_time"], "09:00");
    let clinic_id = clinic["id"].as_str().unwrap().to_string();

    let response = app.clone()
        .oneshot(json_request(
            "POST",
            &format!("/{}/services", clinic_id),
            &admin,
            json!({"name": "Consulta", "price": 8500.0, "duration_minutes": 30, "vip_discount_percent": 20.0}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let client = JwtTestUtils::bearer(&TestUser::cliente("ana@example.com"), &config.jwt_secret);
    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/{}/services", clinic_id))
                .header("Authorization", client)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let services = read_json(response).await;
    assert_eq!(services.as_array().unwrap().len(), 1);
    assert_eq!(services[0]["vip_discount_percent"], 20.0);
}

#[tokio::test]
async fn test_client_cannot_create_clinic() {
    let config = TestConfig::default();
    let client = JwtTestUtils::bearer(&TestUser::cliente("ana@example.com"), &config.jwt_secret);

    let response = app(&config)
        .oneshot(json_request("POST", "/", &client, clinic_body()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_invalid_clinic_reports_fields() {
    let config = TestConfig::default();
    let admin = JwtTestUtils::bearer(&TestUser::admin("admin@clinic.test"), &config.jwt_secret);

    let mut body = clinic_body();
    body["close_time"] = json!("25:00");

    let response = app(&config)
        .oneshot(json_request("POST", "/", &admin, body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error = read_json(response).await;
    assert_eq!(error["fields"][0]["field"], "close_time");
}

#[tokio::test]
async fn test_requests_without_token_are_rejected() {
    let response = app(&TestConfig::default())
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_supabase_store_reads_postgres_time_columns() {
    let mock_server = MockServer::start().await;
    let clinic_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/clinics"))
        .and(query_param("id", format!("eq.{}", clinic_id)))
        .and(header("apikey", "test-anon-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "id": clinic_id,
            "name": "Clinica Centro",
            "address": null,
            "phone": null,
            "open_time": "09:00:00",
            "close_time": "18:00:00",
            "working_days": [1, 2, 3, 4, 5],
            "timezone": "America/Sao_Paulo",
            "utc_offset_minutes": -180,
            "is_active": true,
            "created_at": "2030-01-01T00:00:00Z",
            "updated_at": "2030-01-01T00:00:00Z"
        }])))
        .mount(&mock_server)
        .await;

    let config = TestConfig::with_supabase_url(&mock_server.uri()).to_app_config();
    let store = SupabaseCatalogStore::new(Arc::new(SupabaseClient::new(&config)));

    let clinic = store.get_clinic(clinic_id).await.unwrap().unwrap();
    assert_eq!(clinic.open_time.to_string(), "09:00:00");
    assert_eq!(clinic.working_days, vec![1, 2, 3, 4, 5]);
    assert_eq!(clinic.utc_offset_minutes, -180);
}
