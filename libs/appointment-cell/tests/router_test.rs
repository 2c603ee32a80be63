use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use chrono::{NaiveDate, NaiveTime};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use appointment_cell::handlers::AppointmentState;
use appointment_cell::router::appointment_routes;
use appointment_cell::{
    Appointment, AppointmentError, AppointmentStatus, AppointmentStore, BookingService,
    InMemoryAppointmentStore, NewAppointment, SupabaseAppointmentStore, calculate_price,
};
use clinic_cell::{CatalogService, Clinic, CreateClinicRequest, CreateServiceRequest, InMemoryCatalogStore, Service};
use notification_cell::{LoggingNotificationSender, NotificationDispatcher};
use shared_database::SupabaseClient;
use shared_utils::rate_limit::{InMemoryRateLimitStore, RateLimiter};
use shared_utils::test_utils::{JwtTestUtils, TestConfig, TestUser};
use vip_cell::{VipError, VipStatusProvider};

struct NeverVip;

#[async_trait]
impl VipStatusProvider for NeverVip {
    async fn is_vip(&self, _user_id: Uuid) -> Result<bool, VipError> {
        Ok(false)
    }
}

async fn app(config: &TestConfig, max_requests: u32) -> (Router, Clinic, Service) {
    let catalog = CatalogService::new(Arc::new(InMemoryCatalogStore::new()));
    let clinic = catalog.create_clinic(CreateClinicRequest {
        name: "Clinica Jardins".to_string(),
        address: Some("Rua Oscar Freire, 100".to_string()),
        phone: None,
        open_time: "09:00".to_string(),
        close_time: "12:00".to_string(),
        working_days: vec![1, 2, 3, 4, 5],
        timezone: Some("America/Sao_Paulo".to_string()),
        utc_offset_minutes: Some(-180),
    }).await.unwrap();
    let service = catalog.create_service(clinic.id, CreateServiceRequest {
        name: "Botox".to_string(),
        description: None,
        price: 1200.0,
        duration_minutes: 60,
        vip_discount_percent: 15.0,
        is_vip_only: false,
    }).await.unwrap();

    let booking = BookingService::new(
        catalog,
        Arc::new(InMemoryAppointmentStore::new()),
        Arc::new(NeverVip),
        NotificationDispatcher::new(Arc::new(LoggingNotificationSender), Duration::from_secs(1)),
    );

    let router = appointment_routes(Arc::new(AppointmentState {
        config: config.to_arc(),
        booking: Arc::new(booking),
        rate_limiter: Arc::new(RateLimiter::new(
            Arc::new(InMemoryRateLimitStore::new()),
            max_requests,
            Duration::from_secs(60),
        )),
    }));

    (router, clinic, service)
}

fn send(method: &str, uri: &str, token: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("Authorization", token);

    match body {
        Some(body) => builder
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn read_json(response: axum::response::Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn booking_body(clinic: &Clinic, service: &Service, time: &str) -> Value {
    json!({
        "clinic_id": clinic.id,
        "service_id": service.id,
        "date": "2030-01-07",
        "time": time,
    })
}

#[tokio::test]
async fn test_book_then_slot_disappears() {
    let config = TestConfig::default();
    let (app, clinic, service) = app(&config, 10).await;
    let token = JwtTestUtils::bearer(&TestUser::cliente("ana@example.com"), &config.jwt_secret);

    let response = app.clone()
        .oneshot(send("POST", "/", &token, Some(booking_body(&clinic, &service, "10:00"))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = read_json(response).await;
    assert_eq!(created["status"], "SCHEDULED");
    assert_eq!(created["time"], "10:00");
    assert_eq!(created["final_price"], 1200.0);

    let response = app.clone()
        .oneshot(send("POST", "/", &token, Some(booking_body(&clinic, &service, "10:00"))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let uri = format!(
        "/availability?clinic_id={}&service_id={}&date=2030-01-07",
        clinic.id, service.id
    );
    let response = app.oneshot(send("GET", &uri, &token, None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await["slots"], json!(["09:00", "09:30", "10:30", "11:00"]));
}

#[tokio::test]
async fn test_other_client_gets_forbidden() {
    let config = TestConfig::default();
    let (app, clinic, service) = app(&config, 10).await;
    let ana = JwtTestUtils::bearer(&TestUser::cliente("ana@example.com"), &config.jwt_secret);
    let bia = JwtTestUtils::bearer(&TestUser::cliente("bia@example.com"), &config.jwt_secret);
    let staff = JwtTestUtils::bearer(&TestUser::staff("recepcao@example.com"), &config.jwt_secret);

    let response = app.clone()
        .oneshot(send("POST", "/", &ana, Some(booking_body(&clinic, &service, "09:00"))))
        .await
        .unwrap();
    let id = read_json(response).await["id"].as_str().unwrap().to_string();

    let response = app.clone().oneshot(send("GET", &format!("/{}", id), &bia, None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app.clone()
        .oneshot(send("POST", &format!("/{}/confirm", id), &staff, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await["status"], "CONFIRMED");

    let response = app.clone()
        .oneshot(send("POST", &format!("/{}/cancel", id), &ana, Some(json!({"reason": "viagem"}))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(send("POST", &format!("/{}/cancel", id), &ana, Some(json!({}))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_cancel_and_complete_accept_empty_body() {
    let config = TestConfig::default();
    let (app, clinic, service) = app(&config, 10).await;
    let ana = JwtTestUtils::bearer(&TestUser::cliente("ana@example.com"), &config.jwt_secret);
    let staff = JwtTestUtils::bearer(&TestUser::staff("recepcao@example.com"), &config.jwt_secret);

    let mut ids = Vec::new();
    for time in ["09:00", "10:00"] {
        let response = app.clone()
            .oneshot(send("POST", "/", &ana, Some(booking_body(&clinic, &service, time))))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        ids.push(read_json(response).await["id"].as_str().unwrap().to_string());
    }

    let response = app.clone()
        .oneshot(send("POST", &format!("/{}/cancel", ids[0]), &ana, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await["status"], "CANCELLED");

    let response = app.clone()
        .oneshot(send("POST", &format!("/{}/confirm", ids[1]), &staff, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(send("POST", &format!("/{}/complete", ids[1]), &staff, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await["status"], "COMPLETED");
}

#[tokio::test]
async fn test_invalid_booking_fields() {
    let config = TestConfig::default();
    let (app, clinic, service) = app(&config, 10).await;
    let token = JwtTestUtils::bearer(&TestUser::cliente("ana@example.com"), &config.jwt_secret);

    let body = json!({
        "clinic_id": clinic.id,
        "service_id": service.id,
        "date": "07/01/2030",
        "time": "10:00",
    });
    let response = app.oneshot(send("POST", "/", &token, Some(body))).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(read_json(response).await["fields"][0]["field"], "date");
}

#[tokio::test]
async fn test_booking_is_rate_limited() {
    let config = TestConfig::default();
    let (app, clinic, service) = app(&config, 1).await;
    let token = JwtTestUtils::bearer(&TestUser::cliente("ana@example.com"), &config.jwt_secret);

    let response = app.clone()
        .oneshot(send("POST", "/", &token, Some(booking_body(&clinic, &service, "09:00"))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .oneshot(send("POST", "/", &token, Some(booking_body(&clinic, &service, "11:00"))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_reminder_job_is_admin_only() {
    let config = TestConfig::default();
    let (app, _, _) = app(&config, 10).await;
    let client = JwtTestUtils::bearer(&TestUser::cliente("ana@example.com"), &config.jwt_secret);
    let admin = JwtTestUtils::bearer(&TestUser::admin("ops@example.com"), &config.jwt_secret);

    let response = app.clone().oneshot(send("POST", "/jobs/reminders", &client, None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app.oneshot(send("POST", "/jobs/reminders", &admin, None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await, json!({"reminders_sent": 0}));
}

#[tokio::test]
async fn test_requires_token() {
    let config = TestConfig::default();
    let (app, _, _) = app(&config, 10).await;

    let request = Request::builder().uri("/search").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

fn appointment() -> Appointment {
    let booking = NewAppointment {
        user_id: None,
        clinic_id: Uuid::new_v4(),
        service_id: Uuid::new_v4(),
        date: NaiveDate::from_ymd_opt(2030, 1, 7).unwrap(),
        time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
        notes: None,
    };
    Appointment::scheduled(&booking, Uuid::new_v4(), calculate_price(1200.0, 15.0, false))
}

fn supabase_store(server: &MockServer) -> SupabaseAppointmentStore {
    let config = TestConfig::with_supabase_url(&server.uri()).to_app_config();
    SupabaseAppointmentStore::new(Arc::new(SupabaseClient::new(&config)))
}

#[tokio::test]
async fn test_supabase_slot_violation_maps_to_unavailable() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "code": "23505",
            "message": "duplicate key value violates unique constraint \"appointments_active_slot\""
        })))
        .mount(&mock_server)
        .await;

    let store = supabase_store(&mock_server);
    assert_matches!(store.insert_if_slot_free(appointment()).await, Err(AppointmentError::SlotUnavailable));
}

#[tokio::test]
async fn test_supabase_stale_update_is_concurrent_modification() {
    let mock_server = MockServer::start().await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("version", "eq.1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let store = supabase_store(&mock_server);
    assert_matches!(store.update(appointment(), 1).await, Err(AppointmentError::ConcurrentModification));
}

#[tokio::test]
async fn test_supabase_occupying_rows_parse_database_times() {
    let mock_server = MockServer::start().await;
    let stored = appointment();

    let mut row = serde_json::to_value(&stored).unwrap();
    row["time"] = json!("10:00:00");

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("status", "in.(SCHEDULED,CONFIRMED,IN_PROGRESS)"))
        .and(query_param("date", "eq.2030-01-07"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([row])))
        .mount(&mock_server)
        .await;

    let store = supabase_store(&mock_server);
    let rows = store.list_occupying(stored.clinic_id, stored.date).await.unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].time, NaiveTime::from_hms_opt(10, 0, 0).unwrap());
    assert_eq!(rows[0].status, AppointmentStatus::Scheduled);
}
