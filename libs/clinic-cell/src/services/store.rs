use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Method;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use shared_database::{DatabaseError, SupabaseClient};

use crate::models::{CatalogError, Clinic, Service, ServiceChanges};

/// Persistence for clinics and the services they offer.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn list_clinics(&self, include_inactive: bool) -> Result<Vec<Clinic>, CatalogError>;
    async fn get_clinic(&self, clinic_id: Uuid) -> Result<Option<Clinic>, CatalogError>;
    async fn insert_clinic(&self, clinic: Clinic) -> Result<Clinic, CatalogError>;

    async fn list_services(&self, clinic_id: Uuid, include_inactive: bool) -> Result<Vec<Service>, CatalogError>;
    async fn get_service(&self, service_id: Uuid) -> Result<Option<Service>, CatalogError>;
    async fn insert_service(&self, service: Service) -> Result<Service, CatalogError>;
    async fn update_service(&self, service_id: Uuid, changes: ServiceChanges) -> Result<Option<Service>, CatalogError>;
}

// ==============================================================================
// SUPABASE
// ==============================================================================

pub struct SupabaseCatalogStore {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseCatalogStore {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    async fn fetch<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<Vec<T>, CatalogError> {
        let rows: Vec<T> = self.supabase.request(Method::GET, path, None, None).await?;
        Ok(rows)
    }

    async fn write<T: serde::de::DeserializeOwned>(&self, method: Method, path: &str, body: Value) -> Result<Vec<T>, CatalogError> {
        let rows: Vec<T> = self.supabase.request_with_headers(
            method,
            path,
            None,
            Some(body),
            Some(SupabaseClient::representation_headers()),
        ).await?;
        Ok(rows)
    }
}

#[async_trait]
impl CatalogStore for SupabaseCatalogStore {
    async fn list_clinics(&self, include_inactive: bool) -> Result<Vec<Clinic>, CatalogError> {
        let mut path = "/rest/v1/clinics?order=name.asc".to_string();
        if !include_inactive {
            path.push_str("&is_active=eq.true");
        }
        self.fetch(&path).await
    }

    async fn get_clinic(&self, clinic_id: Uuid) -> Result<Option<Clinic>, CatalogError> {
        debug!("Fetching clinic {}", clinic_id);
        let rows: Vec<Clinic> = self.fetch(&format!("/rest/v1/clinics?id=eq.{}", clinic_id)).await?;
        Ok(rows.into_iter().next())
    }

    async fn insert_clinic(&self, clinic: Clinic) -> Result<Clinic, CatalogError> {
        let body = serde_json::to_value(&clinic).map_err(DatabaseError::from)?;
        let rows: Vec<Clinic> = self.write(Method::POST, "/rest/v1/clinics", body).await?;
        rows.into_iter().next().ok_or_else(|| empty_write("clinics"))
    }

    async fn list_services(&self, clinic_id: Uuid, include_inactive: bool) -> Result<Vec<Service>, CatalogError> {
        let mut path = format!("/rest/v1/services?clinic_id=eq.{}&order=name.asc", clinic_id);
        if !include_inactive {
            path.push_str("&is_active=eq.true");
        }
        self.fetch(&path).await
    }

    async fn get_service(&self, service_id: Uuid) -> Result<Option<Service>, CatalogError> {
        debug!("Fetching service {}", service_id);
        let rows: Vec<Service> = self.fetch(&format!("/rest/v1/services?id=eq.{}", service_id)).await?;
        Ok(rows.into_iter().next())
    }

    async fn insert_service(&self, service: Service) -> Result<Service, CatalogError> {
        let body = serde_json::to_value(&service).map_err(DatabaseError::from)?;
        let rows: Vec<Service> = self.write(Method::POST, "/rest/v1/services", body).await?;
        rows.into_iter().next().ok_or_else(|| empty_write("services"))
    }

    async fn update_service(&self, service_id: Uuid, changes: ServiceChanges) -> Result<Option<Service>, CatalogError> {
        let mut body = serde_json::to_value(&changes).map_err(DatabaseError::from)?;
        if let Value::Object(map) = &mut body {
            map.insert("updated_at".to_string(), Value::String(Utc::now().to_rfc3339()));
        }

        let path = format!("/rest/v1/services?id=eq.{}", service_id);
        let rows: Vec<Service> = self.write(Method::PATCH, &path, body).await?;
        Ok(rows.into_iter().next())
    }
}

fn empty_write(table: &str) -> CatalogError {
    CatalogError::Database(DatabaseError::NotFound(format!("insert into {} returned no rows", table)))
}

// ==============================================================================
// IN-MEMORY
// ==============================================================================

#[derive(Default)]
pub struct InMemoryCatalogStore {
    clinics: RwLock<HashMap<Uuid, Clinic>>,
    services: RwLock<HashMap<Uuid, Service>>,
}

impl InMemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalogStore {
    async fn list_clinics(&self, include_inactive: bool) -> Result<Vec<Clinic>, CatalogError> {
        let clinics = self.clinics.read().await;
        let mut list: Vec<Clinic> = clinics.values()
            .filter(|c| include_inactive || c.is_active)
            .cloned()
            .collect();
        list.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(list)
    }

    async fn get_clinic(&self, clinic_id: Uuid) -> Result<Option<Clinic>, CatalogError> {
        Ok(self.clinics.read().await.get(&clinic_id).cloned())
    }

    async fn insert_clinic(&self, clinic: Clinic) -> Result<Clinic, CatalogError> {
        self.clinics.write().await.insert(clinic.id, clinic.clone());
        Ok(clinic)
    }

    async fn list_services(&self, clinic_id: Uuid, include_inactive: bool) -> Result<Vec<Service>, CatalogError> {
        let services = self.services.read().await;
        let mut list: Vec<Service> = services.values()
            .filter(|s| s.clinic_id == clinic_id && (include_inactive || s.is_active))
            .cloned()
            .collect();
        list.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(list)
    }

    async fn get_service(&self, service_id: Uuid) -> Result<Option<Service>, CatalogError> {
        Ok(self.services.read().await.get(&service_id).cloned())
    }

    async fn insert_service(&self, service: Service) -> Result<Service, CatalogError> {
        self.services.write().await.insert(service.id, service.clone());
        Ok(service)
    }

    async fn update_service(&self, service_id: Uuid, changes: ServiceChanges) -> Result<Option<Service>, CatalogError> {
        let mut services = self.services.write().await;
        Ok(services.get_mut(&service_id).map(|service| {
            service.apply(changes);
            service.clone()
        }))
    }
}
