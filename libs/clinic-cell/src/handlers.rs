use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;
use shared_utils::extractor::require_admin;

use crate::models::{
    Clinic, ClinicListQuery, CreateClinicRequest, CreateServiceRequest, Service, ServiceChanges,
};
use crate::services::CatalogService;

pub struct ClinicState {
    pub config: Arc<AppConfig>,
    pub catalog: CatalogService,
}

pub async fn list_clinics(
    State(state): State<Arc<ClinicState>>,
    Extension(user): Extension<User>,
    Query(query): Query<ClinicListQuery>,
) -> Result<Json<Vec<Clinic>>, AppError> {
    // Inactive clinics are only listed for staff
    let include_inactive = query.include_inactive.unwrap_or(false) && user.user_role().is_staff();
    let clinics = state.catalog.list_clinics(include_inactive).await?;
    Ok(Json(clinics))
}

pub async fn get_clinic(
    State(state): State<Arc<ClinicState>>,
    Path(clinic_id): Path<Uuid>,
) -> Result<Json<Clinic>, AppError> {
    let clinic = state.catalog.get_clinic(clinic_id).await?;
    Ok(Json(clinic))
}

pub async fn create_clinic(
    State(state): State<Arc<ClinicState>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateClinicRequest>,
) -> Result<(StatusCode, Json<Clinic>), AppError> {
    require_admin(&user)?;
    let clinic = state.catalog.create_clinic(request).await?;
    Ok((StatusCode::CREATED, Json(clinic)))
}

pub async fn list_services(
    State(state): State<Arc<ClinicState>>,
    Extension(user): Extension<User>,
    Path(clinic_id): Path<Uuid>,
    Query(query): Query<ClinicListQuery>,
) -> Result<Json<Vec<Service>>, AppError> {
    let include_inactive = query.include_inactive.unwrap_or(false) && user.user_role().is_staff();
    let services = state.catalog.list_services(clinic_id, include_inactive).await?;
    Ok(Json(services))
}

pub async fn create_service(
    State(state): State<Arc<ClinicState>>,
    Extension(user): Extension<User>,
    Path(clinic_id): Path<Uuid>,
    Json(request): Json<CreateServiceRequest>,
) -> Result<(StatusCode, Json<Service>), AppError> {
    require_admin(&user)?;
    let service = state.catalog.create_service(clinic_id, request).await?;
    Ok((StatusCode::CREATED, Json(service)))
}

pub async fn update_service(
    State(state): State<Arc<ClinicState>>,
    Extension(user): Extension<User>,
    Path(service_id): Path<Uuid>,
    Json(changes): Json<ServiceChanges>,
) -> Result<Json<Service>, AppError> {
    require_admin(&user)?;
    let service = state.catalog.update_service(service_id, changes).await?;
    Ok(Json(service))
}
