use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use crate::models::{
    CatalogError, Clinic, CreateClinicRequest, CreateServiceRequest, Service, ServiceChanges,
};
use crate::services::store::CatalogStore;

/// Clinic and service catalog, including the lookups booking relies on.
#[derive(Clone)]
pub struct CatalogService {
    store: Arc<dyn CatalogStore>,
}

impl CatalogService {
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self { store }
    }

    pub async fn list_clinics(&self, include_inactive: bool) -> Result<Vec<Clinic>, CatalogError> {
        self.store.list_clinics(include_inactive).await
    }

    pub async fn get_clinic(&self, clinic_id: Uuid) -> Result<Clinic, CatalogError> {
        self.store.get_clinic(clinic_id).await?
            .ok_or(CatalogError::ClinicNotFound)
    }

    pub async fn create_clinic(&self, request: CreateClinicRequest) -> Result<Clinic, CatalogError> {
        let new_clinic = request.validate()?;
        let clinic = self.store.insert_clinic(Clinic::from_new(new_clinic)).await?;
        info!("Clinic {} created ({})", clinic.id, clinic.name);
        Ok(clinic)
    }

    pub async fn list_services(&self, clinic_id: Uuid, include_inactive: bool) -> Result<Vec<Service>, CatalogError> {
        self.get_clinic(clinic_id).await?;
        self.store.list_services(clinic_id, include_inactive).await
    }

    pub async fn get_service(&self, service_id: Uuid) -> Result<Service, CatalogError> {
        self.store.get_service(service_id).await?
            .ok_or(CatalogError::ServiceNotFound)
    }

    pub async fn create_service(&self, clinic_id: Uuid, request: CreateServiceRequest) -> Result<Service, CatalogError> {
        let new_service = request.validate()?;
        self.get_clinic(clinic_id).await?;

        let service = self.store.insert_service(Service::from_new(clinic_id, new_service)).await?;
        info!("Service {} added to clinic {}", service.id, clinic_id);
        Ok(service)
    }

    pub async fn update_service(&self, service_id: Uuid, changes: ServiceChanges) -> Result<Service, CatalogError> {
        let changes = changes.validate()?;
        let service = self.store.update_service(service_id, changes).await?
            .ok_or(CatalogError::ServiceNotFound)?;
        info!("Service {} updated", service_id);
        Ok(service)
    }

    /// Resolves the clinic and an active service it offers, as needed to book.
    pub async fn bookable(&self, clinic_id: Uuid, service_id: Uuid) -> Result<(Clinic, Service), CatalogError> {
        debug!("Resolving service {} at clinic {}", service_id, clinic_id);

        let clinic = self.get_clinic(clinic_id).await?;
        let service = self.get_service(service_id).await?;

        if service.clinic_id != clinic.id {
            return Err(CatalogError::ServiceNotInClinic);
        }
        if !service.is_active {
            return Err(CatalogError::ServiceInactive);
        }

        Ok((clinic, service))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::store::InMemoryCatalogStore;
    use assert_matches::assert_matches;

    fn clinic_request() -> CreateClinicRequest {
        CreateClinicRequest {
            name: "Centro".to_string(),
            address: None,
            phone: None,
            open_time: "09:00".to_string(),
            close_time: "18:00".to_string(),
            working_days: vec![1, 2, 3, 4, 5],
            timezone: None,
            utc_offset_minutes: None,
        }
    }

    fn service_request() -> CreateServiceRequest {
        CreateServiceRequest {
            name: "Consulta".to_string(),
            description: None,
            price: 8500.0,
            duration_minutes: 30,
            vip_discount_percent: 20.0,
            is_vip_only: false,
        }
    }

    #[tokio::test]
    async fn test_bookable_requires_matching_active_service() {
        let catalog = CatalogService::new(Arc::new(InMemoryCatalogStore::new()));
        let clinic = catalog.create_clinic(clinic_request()).await.unwrap();
        let other = catalog.create_clinic(clinic_request()).await.unwrap();
        let service = catalog.create_service(clinic.id, service_request()).await.unwrap();

        assert!(catalog.bookable(clinic.id, service.id).await.is_ok());
        assert_matches!(catalog.bookable(other.id, service.id).await, Err(CatalogError::ServiceNotInClinic));

        catalog.update_service(service.id, ServiceChanges { is_active: Some(false), ..Default::default() })
            .await
            .unwrap();
        assert_matches!(catalog.bookable(clinic.id, service.id).await, Err(CatalogError::ServiceInactive));
    }

    #[tokio::test]
    async fn test_service_needs_existing_clinic() {
        let catalog = CatalogService::new(Arc::new(InMemoryCatalogStore::new()));
        let result = catalog.create_service(Uuid::new_v4(), service_request()).await;
        assert_matches!(result, Err(CatalogError::ClinicNotFound));
    }
}
