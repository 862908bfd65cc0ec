//! Universal medical IDs: emergency codes that expose a patient's critical
//! information without sign-in.
//!
//! A patient holds at most one active code. Generating a new one revokes the
//! previous code in the same write batch.

use std::sync::Arc;

use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

#[cfg(feature = "with-api")]
use utoipa::ToSchema;

use care_hub_data::models::umid::{EmergencyContact, EmergencyInfo, Umid};
use care_hub_data::models::user::User;
use care_hub_data::store::{timestamp_value, DocumentStore, Query, WriteOp};
use care_hub_data::{Collection, Entity};

use crate::audit::{AuditLogger, SecurityEvent, SecurityEventType};
use crate::auth::UserInfo;
use crate::services::errors::{forbidden, ServiceError, ServiceResult};

const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const MAX_CODE_ATTEMPTS: usize = 5;

/// Emergency details as submitted by the patient
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[cfg_attr(feature = "with-api", derive(ToSchema))]
#[serde(default)]
pub struct EmergencyInfoRequest {
    #[validate(length(max = 3))]
    pub blood_type: Option<String>,
    #[validate(length(max = 50))]
    pub allergies: Vec<String>,
    #[validate(length(max = 50))]
    pub conditions: Vec<String>,
    #[validate(length(max = 50))]
    pub medications: Vec<String>,
    #[validate(length(max = 5))]
    pub emergency_contacts: Vec<EmergencyContact>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

impl From<EmergencyInfoRequest> for EmergencyInfo {
    fn from(request: EmergencyInfoRequest) -> Self {
        let clean = |items: Vec<String>| -> Vec<String> {
            items
                .into_iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        };
        EmergencyInfo {
            blood_type: request.blood_type.map(|b| b.trim().to_uppercase()),
            allergies: clean(request.allergies),
            conditions: clean(request.conditions),
            medications: clean(request.medications),
            emergency_contacts: request.emergency_contacts,
            notes: request.notes,
        }
    }
}

/// Content encoded in the printable QR code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "with-api", derive(ToSchema))]
pub struct QrPayload {
    pub code: String,
    /// Public emergency page for the code
    pub url: String,
}

/// What a first responder sees
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "with-api", derive(ToSchema))]
pub struct EmergencyView {
    pub code: String,
    pub patient_name: Option<String>,
    pub emergency_info: EmergencyInfo,
}

#[derive(Clone)]
pub struct UmidService {
    umids: Collection<Umid>,
    users: Collection<User>,
    audit: AuditLogger,
    base_url: String,
}

impl UmidService {
    pub fn new(store: Arc<dyn DocumentStore>, audit: AuditLogger, base_url: impl Into<String>) -> Self {
        Self {
            umids: Collection::new(store.clone()),
            users: Collection::new(store),
            audit,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Issue a new code for the patient, revoking the current one
    #[instrument(skip(self, user, info), fields(user_id = %user.user_id))]
    pub async fn generate(&self, user: &UserInfo, patient_id: &str, info: EmergencyInfoRequest) -> ServiceResult<Umid> {
        if !user.is_self_or_admin(patient_id) {
            return Err(forbidden("generate a medical ID for this patient"));
        }
        info.validate()?;

        let code = self.unused_code().await?;
        let now = Utc::now();
        let current = self.active_for(patient_id).await?;

        let umid = Umid {
            id: Uuid::new_v4().to_string(),
            patient_id: patient_id.to_string(),
            code,
            // Details carry over unless new ones are given
            emergency_info: match (&current, is_empty(&info)) {
                (Some(previous), true) => previous.emergency_info.clone(),
                _ => info.into(),
            },
            active: true,
            created_at: now,
            revoked_at: None,
            access_count: 0,
            last_accessed_at: None,
        };

        let mut writes = Vec::with_capacity(2);
        if let Some(previous) = &current {
            writes.push(WriteOp::Update {
                collection: Umid::COLLECTION.to_string(),
                id: previous.id.clone(),
                patch: json!({ "active": false, "revoked_at": timestamp_value(now) }),
            });
        }
        writes.push(WriteOp::Set {
            collection: Umid::COLLECTION.to_string(),
            id: umid.id.clone(),
            data: Collection::<Umid>::encode(&umid)?,
        });
        self.umids.store().batch(writes).await?;

        info!("Generated medical ID {} for patient {}", umid.id, patient_id);
        self.log(
            SecurityEvent::success(SecurityEventType::UmidGenerated, &user.user_id).with_resource(resource(&umid.id)),
        )
        .await;
        Ok(umid)
    }

    /// The patient's active code
    pub async fn get_for_patient(&self, user: &UserInfo, patient_id: &str) -> ServiceResult<Umid> {
        if !user.can_access_patient(patient_id) {
            return Err(forbidden("view this medical ID"));
        }
        self.active_for(patient_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("no active medical ID for {}", patient_id)))
    }

    pub fn qr_payload(&self, umid: &Umid) -> QrPayload {
        QrPayload {
            code: umid.code.clone(),
            url: format!("{}/emergency/{}", self.base_url, umid.code),
        }
    }

    /// Unauthenticated lookup by code; every access is counted and audited
    pub async fn emergency_access(&self, code: &str, accessor: Option<&str>) -> ServiceResult<EmergencyView> {
        let code = code.trim().to_uppercase();
        let umid = match self
            .umids
            .find_one(Query::new().where_eq("code", code.as_str()).where_eq("active", true))
            .await?
        {
            Some(umid) => umid,
            None => {
                warn!("Emergency lookup of unknown or revoked code");
                self.log(
                    SecurityEvent::new(SecurityEventType::UmidAccessed, accessor, false)
                        .with_details("unknown or revoked code"),
                )
                .await;
                return Err(ServiceError::NotFound("medical ID".to_string()));
            }
        };

        self.umids
            .update(
                &umid.id,
                json!({
                    "access_count": umid.access_count + 1,
                    "last_accessed_at": timestamp_value(Utc::now()),
                }),
            )
            .await?;

        let patient_name = self.users.get(&umid.patient_id).await?.map(|u| u.display_name);

        self.log(
            SecurityEvent::new(SecurityEventType::UmidAccessed, accessor, true)
                .with_resource(resource(&umid.id))
                .with_details(format!("patient {}", umid.patient_id)),
        )
        .await;

        Ok(EmergencyView {
            code: umid.code,
            patient_name,
            emergency_info: umid.emergency_info,
        })
    }

    pub async fn revoke(&self, user: &UserInfo, umid_id: &str) -> ServiceResult<Umid> {
        let umid = self.umids.require(umid_id).await?;
        if !user.is_self_or_admin(&umid.patient_id) {
            return Err(forbidden("revoke this medical ID"));
        }
        if !umid.active {
            return Err(ServiceError::Conflict("medical ID already revoked".to_string()));
        }

        let revoked = self
            .umids
            .update(umid_id, json!({ "active": false, "revoked_at": timestamp_value(Utc::now()) }))
            .await?;
        self.log(SecurityEvent::success(SecurityEventType::UmidRevoked, &user.user_id).with_resource(resource(umid_id)))
            .await;
        Ok(revoked)
    }

    pub async fn update_emergency_info(
        &self,
        user: &UserInfo,
        umid_id: &str,
        info: EmergencyInfoRequest,
    ) -> ServiceResult<Umid> {
        info.validate()?;
        let umid = self.umids.require(umid_id).await?;
        if !user.is_self_or_admin(&umid.patient_id) {
            return Err(forbidden("update this medical ID"));
        }
        if !umid.active {
            return Err(ServiceError::Conflict("medical ID is revoked".to_string()));
        }

        let emergency_info: EmergencyInfo = info.into();
        let updated = self
            .umids
            .update(umid_id, json!({ "emergency_info": emergency_info }))
            .await?;
        self.log(SecurityEvent::success(SecurityEventType::UmidUpdated, &user.user_id).with_resource(resource(umid_id)))
            .await;
        Ok(updated)
    }

    async fn active_for(&self, patient_id: &str) -> ServiceResult<Option<Umid>> {
        Ok(self
            .umids
            .find_one(Query::new().where_eq("patient_id", patient_id).where_eq("active", true))
            .await?)
    }

    async fn unused_code(&self) -> ServiceResult<String> {
        for _ in 0..MAX_CODE_ATTEMPTS {
            let code = random_code();
            if self.umids.find_one(Query::new().where_eq("code", code.as_str())).await?.is_none() {
                return Ok(code);
            }
        }
        Err(ServiceError::Conflict("could not allocate a unique medical ID".to_string()))
    }

    async fn log(&self, event: SecurityEvent) {
        self.audit.log(event).await;
    }
}

/// `UMID-XXXX-XXXX-XXXX` without look-alike characters
pub fn random_code() -> String {
    let mut rng = rand::thread_rng();
    let groups: Vec<String> = (0..3)
        .map(|_| {
            (0..4)
                .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
                .collect()
        })
        .collect();
    format!("UMID-{}", groups.join("-"))
}

fn is_empty(info: &EmergencyInfoRequest) -> bool {
    info.blood_type.is_none()
        && info.allergies.is_empty()
        && info.conditions.is_empty()
        && info.medications.is_empty()
        && info.emergency_contacts.is_empty()
        && info.notes.is_none()
}

fn resource(id: &str) -> String {
    format!("{}/{}", Umid::COLLECTION, id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::services::test_support::{seed_user, user_info, TestStore};

    fn info() -> EmergencyInfoRequest {
        EmergencyInfoRequest {
            blood_type: Some(" o+ ".to_string()),
            allergies: vec!["Penicillin".to_string(), "  ".to_string()],
            emergency_contacts: vec![EmergencyContact {
                name: "Sam".to_string(),
                relationship: "Sibling".to_string(),
                phone: "+15550100".to_string(),
            }],
            ..Default::default()
        }
    }

    fn service(store: &TestStore) -> UmidService {
        UmidService::new(store.dyn_store(), store.audit(), "https://care.example/")
    }

    #[test]
    fn test_code_format() {
        let code = random_code();
        assert_eq!(code.len(), "UMID-XXXX-XXXX-XXXX".len());
        assert!(code.starts_with("UMID-"));
        assert!(code[5..]
            .split('-')
            .all(|g| g.len() == 4 && g.bytes().all(|b| CODE_ALPHABET.contains(&b))));
    }

    #[tokio::test]
    async fn test_generate_revokes_previous_code() {
        let store = TestStore::new();
        let service = service(&store);
        let patient = user_info("p1", Role::Patient);

        let first = service.generate(&patient, "p1", info()).await.unwrap();
        assert_eq!(first.emergency_info.blood_type.as_deref(), Some("O+"));
        assert_eq!(first.emergency_info.allergies, vec!["Penicillin"]);

        let second = service.generate(&patient, "p1", EmergencyInfoRequest::default()).await.unwrap();
        assert_ne!(first.code, second.code);
        assert_eq!(second.emergency_info, first.emergency_info);

        let active = service.get_for_patient(&patient, "p1").await.unwrap();
        assert_eq!(active.id, second.id);
        assert!(matches!(
            service.emergency_access(&first.code, None).await,
            Err(ServiceError::NotFound(_))
        ));

        let qr = service.qr_payload(&second);
        assert_eq!(qr.url, format!("https://care.example/emergency/{}", second.code));

        assert!(matches!(
            service.generate(&user_info("p2", Role::Patient), "p1", info()).await,
            Err(ServiceError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_emergency_access_counts_and_audits() {
        let store = TestStore::new();
        seed_user(&store, "p1", Role::Patient).await;
        let service = service(&store);
        let umid = service.generate(&user_info("p1", Role::Patient), "p1", info()).await.unwrap();

        let view = service.emergency_access(&umid.code.to_lowercase(), Some("medic-7")).await.unwrap();
        assert_eq!(view.patient_name.as_deref(), Some("User p1"));
        assert_eq!(view.emergency_info.emergency_contacts.len(), 1);
        service.emergency_access(&umid.code, None).await.unwrap();

        let stored = service.get_for_patient(&user_info("p1", Role::Patient), "p1").await.unwrap();
        assert_eq!(stored.access_count, 2);
        assert!(stored.last_accessed_at.is_some());

        let events = store.audit().recent_events(Some("medic-7"), 10).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "UMID_ACCESSED");
        assert!(events[0].success);
    }

    #[tokio::test]
    async fn test_revoke_and_update() {
        let store = TestStore::new();
        let service = service(&store);
        let patient = user_info("p1", Role::Patient);
        let umid = service.generate(&patient, "p1", info()).await.unwrap();

        let mut changed = info();
        changed.conditions = vec!["Asthma".to_string()];
        let updated = service.update_emergency_info(&patient, &umid.id, changed).await.unwrap();
        assert_eq!(updated.emergency_info.conditions, vec!["Asthma"]);

        service.revoke(&patient, &umid.id).await.unwrap();
        assert!(matches!(service.revoke(&patient, &umid.id).await, Err(ServiceError::Conflict(_))));
        assert!(matches!(
            service.update_emergency_info(&patient, &umid.id, info()).await,
            Err(ServiceError::Conflict(_))
        ));
        assert!(matches!(service.get_for_patient(&patient, "p1").await, Err(ServiceError::NotFound(_))));
    }
}
