use axum::{
    Router,
    routing::get,
};

use appointment_cell::router::appointment_routes;
use clinic_cell::router::clinic_routes;
use vip_cell::router::vip_routes;

use crate::state::Cells;

pub fn create_router(cells: Cells) -> Router {
    Router::new()
        .route("/", get(|| async { "Clinic booking API is running!" }))
        .nest("/clinics", clinic_routes(cells.clinic))
        .nest("/appointments", appointment_routes(cells.appointments))
        .nest("/vip", vip_routes(cells.vip))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{body::Body, http::{Request, StatusCode}};
    use tower::ServiceExt;

    use shared_config::AppConfig;

    use super::*;

    fn app() -> Router {
        let config = Arc::new(AppConfig {
            supabase_jwt_secret: "router-test-secret".to_string(),
            ..AppConfig::default()
        });
        create_router(Cells::build(config).unwrap())
    }

    #[tokio::test]
    async fn test_root_is_public() {
        let response = app()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_cells_are_nested_behind_auth() {
        for uri in ["/clinics", "/appointments/search", "/vip/plans"] {
            let response = app()
                .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{}", uri);
        }
    }
}
