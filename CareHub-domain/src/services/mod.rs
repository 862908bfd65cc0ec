// Domain services
// This module contains business logic implementations.

pub mod appointments;
pub mod billing;
pub mod blog;
pub mod doctors;
pub mod errors;
pub mod lab_results;
pub mod medications;
pub mod profile;
pub mod telemedicine;
pub mod umid;

#[cfg(test)]
pub(crate) mod test_support;

use std::sync::Arc;

use care_hub_data::media::ImageUploader;
use care_hub_data::DocumentStore;

use crate::audit::AuditLogger;
use crate::config::AppConfig;
use crate::health::{HealthService, HealthServiceTrait};

pub use appointments::AppointmentService;
pub use billing::BillingService;
pub use blog::BlogService;
pub use doctors::DoctorService;
pub use errors::{ServiceError, ServiceResult};
pub use lab_results::LabResultService;
pub use medications::MedicationService;
pub use profile::ProfileService;
pub use telemedicine::TelemedicineService;
pub use umid::UmidService;

/// Every service wired over one document store
#[derive(Clone)]
pub struct Services {
    pub appointments: Arc<AppointmentService>,
    pub lab_results: Arc<LabResultService>,
    pub billing: Arc<BillingService>,
    pub doctors: Arc<DoctorService>,
    pub medications: Arc<MedicationService>,
    pub blog: Arc<BlogService>,
    pub profiles: Arc<ProfileService>,
    pub telemedicine: Arc<TelemedicineService>,
    pub umid: Arc<UmidService>,
    pub audit: AuditLogger,
    pub health: Arc<dyn HealthServiceTrait>,
    pub media: ImageUploader,
}

impl Services {
    pub fn new(store: Arc<dyn DocumentStore>, config: &AppConfig, media: ImageUploader) -> Self {
        let audit = AuditLogger::new(store.clone());
        let telemedicine = TelemedicineService::new(store.clone(), &config.telemedicine_base_url);

        Self {
            appointments: Arc::new(AppointmentService::new(store.clone(), telemedicine.clone(), audit.clone())),
            lab_results: Arc::new(LabResultService::new(store.clone(), audit.clone())),
            billing: Arc::new(BillingService::new(store.clone(), audit.clone())),
            doctors: Arc::new(DoctorService::new(store.clone())),
            medications: Arc::new(MedicationService::new(store.clone(), audit.clone())),
            blog: Arc::new(BlogService::new(store.clone(), audit.clone())),
            profiles: Arc::new(ProfileService::new(store.clone(), audit.clone())),
            telemedicine: Arc::new(telemedicine),
            umid: Arc::new(UmidService::new(store.clone(), audit.clone(), config.umid_base_url.as_str())),
            health: Arc::new(HealthService::new(store)),
            audit,
            media,
        }
    }

    /// Replace the health service, used by tests to simulate outages
    pub fn with_health(mut self, health: Arc<dyn HealthServiceTrait>) -> Self {
        self.health = health;
        self
    }
}
