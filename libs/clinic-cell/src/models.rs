use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Offset, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use shared_database::DatabaseError;
use shared_models::error::AppError;
use shared_models::time::{hhmm, parse_hhmm};
use shared_models::validation::ValidationErrors;

// ==============================================================================
// CLINIC
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Clinic {
    pub id: Uuid,
    pub name: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    #[serde(with = "hhmm")]
    pub open_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub close_time: NaiveTime,
    /// ISO weekday codes, 1 = Monday through 7 = Sunday.
    pub working_days: Vec<u8>,
    /// IANA zone name, informational.
    pub timezone: String,
    /// Fixed offset used to evaluate "now" for this clinic.
    #[serde(default)]
    pub utc_offset_minutes: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Clinic {
    pub fn from_new(new: NewClinic) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: new.name,
            address: new.address,
            phone: new.phone,
            open_time: new.open_time,
            close_time: new.close_time,
            working_days: new.working_days,
            timezone: new.timezone,
            utc_offset_minutes: new.utc_offset_minutes,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_working_day(&self, date: NaiveDate) -> bool {
        let code = date.weekday().number_from_monday() as u8;
        self.working_days.contains(&code)
    }

    pub fn offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes * 60)
            .unwrap_or_else(|| Utc.fix())
    }

    /// Wall-clock time at the clinic for the given instant.
    pub fn local_time_at(&self, instant: DateTime<Utc>) -> NaiveDateTime {
        instant.with_timezone(&self.offset()).naive_local()
    }

    pub fn local_now(&self) -> NaiveDateTime {
        self.local_time_at(Utc::now())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateClinicRequest {
    pub name: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub open_time: String,
    pub close_time: String,
    pub working_days: Vec<u8>,
    pub timezone: Option<String>,
    pub utc_offset_minutes: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct NewClinic {
    pub name: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub open_time: NaiveTime,
    pub close_time: NaiveTime,
    pub working_days: Vec<u8>,
    pub timezone: String,
    pub utc_offset_minutes: i32,
}

impl CreateClinicRequest {
    pub fn validate(self) -> Result<NewClinic, ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if self.name.trim().is_empty() {
            errors.add("name", "must not be empty");
        }

        let open_time = parse_hhmm(&self.open_time);
        if open_time.is_none() {
            errors.add("open_time", "expected HH:MM");
        }
        let close_time = parse_hhmm(&self.close_time);
        if close_time.is_none() {
            errors.add("close_time", "expected HH:MM");
        }
        if let (Some(open), Some(close)) = (open_time, close_time) {
            if close <= open {
                errors.add("close_time", "must be after open_time");
            }
        }

        if self.working_days.is_empty() {
            errors.add("working_days", "at least one working day is required");
        } else if self.working_days.iter().any(|day| !(1..=7).contains(day)) {
            errors.add("working_days", "weekday codes must be between 1 and 7");
        }

        let utc_offset_minutes = self.utc_offset_minutes.unwrap_or(0);
        if !(-14 * 60..=14 * 60).contains(&utc_offset_minutes) {
            errors.add("utc_offset_minutes", "must be within -840..=840");
        }

        match (open_time, close_time) {
            (Some(open_time), Some(close_time)) if errors.is_empty() => {
                let mut working_days = self.working_days;
                working_days.sort_unstable();
                working_days.dedup();

                Ok(NewClinic {
                    name: self.name.trim().to_string(),
                    address: self.address,
                    phone: self.phone,
                    open_time,
                    close_time,
                    working_days,
                    timezone: self.timezone.unwrap_or_else(|| "UTC".to_string()),
                    utc_offset_minutes,
                })
            }
            _ => Err(errors),
        }
    }
}

// ==============================================================================
// SERVICE
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Service {
    pub id: Uuid,
    pub clinic_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub price: f64,
    pub duration_minutes: i32,
    pub vip_discount_percent: f64,
    pub is_vip_only: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Service {
    pub fn from_new(clinic_id: Uuid, new: NewService) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            clinic_id,
            name: new.name,
            description: new.description,
            price: new.price,
            duration_minutes: new.duration_minutes,
            vip_discount_percent: new.vip_discount_percent,
            is_vip_only: new.is_vip_only,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn apply(&mut self, changes: ServiceChanges) {
        if let Some(name) = changes.name {
            self.name = name;
        }
        if let Some(description) = changes.description {
            self.description = Some(description);
        }
        if let Some(price) = changes.price {
            self.price = price;
        }
        if let Some(duration) = changes.duration_minutes {
            self.duration_minutes = duration;
        }
        if let Some(discount) = changes.vip_discount_percent {
            self.vip_discount_percent = discount;
        }
        if let Some(vip_only) = changes.is_vip_only {
            self.is_vip_only = vip_only;
        }
        if let Some(active) = changes.is_active {
            self.is_active = active;
        }
        self.updated_at = Utc::now();
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateServiceRequest {
    pub name: String,
    pub description: Option<String>,
    pub price: f64,
    pub duration_minutes: i32,
    #[serde(default)]
    pub vip_discount_percent: f64,
    #[serde(default)]
    pub is_vip_only: bool,
}

#[derive(Debug, Clone)]
pub struct NewService {
    pub name: String,
    pub description: Option<String>,
    pub price: f64,
    pub duration_minutes: i32,
    pub vip_discount_percent: f64,
    pub is_vip_only: bool,
}

impl CreateServiceRequest {
    pub fn validate(self) -> Result<NewService, ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if self.name.trim().is_empty() {
            errors.add("name", "must not be empty");
        }
        check_price(&mut errors, self.price);
        check_duration(&mut errors, self.duration_minutes);
        check_discount(&mut errors, self.vip_discount_percent);

        errors.into_result(NewService {
            name: self.name.trim().to_string(),
            description: self.description,
            price: self.price,
            duration_minutes: self.duration_minutes,
            vip_discount_percent: self.vip_discount_percent,
            is_vip_only: self.is_vip_only,
        })
    }
}

/// Partial service update. Existing appointments keep their price snapshot.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ServiceChanges {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vip_discount_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_vip_only: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

impl ServiceChanges {
    pub fn validate(self) -> Result<ServiceChanges, ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if matches!(&self.name, Some(name) if name.trim().is_empty()) {
            errors.add("name", "must not be empty");
        }
        if let Some(price) = self.price {
            check_price(&mut errors, price);
        }
        if let Some(duration) = self.duration_minutes {
            check_duration(&mut errors, duration);
        }
        if let Some(discount) = self.vip_discount_percent {
            check_discount(&mut errors, discount);
        }

        errors.into_result(self)
    }
}

fn check_price(errors: &mut ValidationErrors, price: f64) {
    if !price.is_finite() || price < 0.0 {
        errors.add("price", "must be a non-negative amount");
    }
}

fn check_duration(errors: &mut ValidationErrors, minutes: i32) {
    if minutes <= 0 || minutes > 24 * 60 {
        errors.add("duration_minutes", "must be between 1 and 1440");
    }
}

fn check_discount(errors: &mut ValidationErrors, percent: f64) {
    if !(0.0..=100.0).contains(&percent) {
        errors.add("vip_discount_percent", "must be between 0 and 100");
    }
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Clinic not found")]
    ClinicNotFound,

    #[error("Service not found")]
    ServiceNotFound,

    #[error("Service is not offered by this clinic")]
    ServiceNotInClinic,

    #[error("Service is inactive")]
    ServiceInactive,

    #[error("Invalid request: {0}")]
    Invalid(#[from] ValidationErrors),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

impl From<CatalogError> for AppError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::ClinicNotFound
            | CatalogError::ServiceNotFound
            | CatalogError::ServiceNotInClinic
            | CatalogError::ServiceInactive => AppError::NotFound(err.to_string()),
            CatalogError::Invalid(errors) => AppError::InvalidFields(errors),
            CatalogError::Database(e) => AppError::Database(e.to_string()),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct ClinicListQuery {
    pub include_inactive: Option<bool>,
}
