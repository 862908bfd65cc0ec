//! Doctor directory and schedules.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

#[cfg(feature = "with-api")]
use utoipa::ToSchema;

use care_hub_data::models::appointment::{Appointment, AppointmentStatus};
use care_hub_data::models::user::{Role, User};
use care_hub_data::store::{Direction, DocumentStore, FilterOp, Query};
use care_hub_data::Collection;

use crate::auth::UserInfo;
use crate::services::errors::{forbidden, ServiceError, ServiceResult};

/// A booked period in a doctor's day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "with-api", derive(ToSchema))]
pub struct BusySlot {
    pub appointment_id: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct DoctorService {
    users: Collection<User>,
    appointments: Collection<Appointment>,
}

impl DoctorService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            users: Collection::new(store.clone()),
            appointments: Collection::new(store),
        }
    }

    /// Active doctors by name, optionally of one specialty
    pub async fn list(&self, specialty: Option<&str>) -> ServiceResult<Vec<User>> {
        let mut query = Query::new()
            .where_eq("role", Role::Doctor.as_str())
            .where_eq("deleted", false);
        if let Some(specialty) = specialty {
            query = query.where_eq("specialty", specialty);
        }
        Ok(self.users.find(query.order_by("display_name", Direction::Asc)).await?)
    }

    pub async fn get(&self, id: &str) -> ServiceResult<User> {
        self.users
            .get(id)
            .await?
            .filter(|user| user.role == Role::Doctor && !user.deleted)
            .ok_or_else(|| ServiceError::NotFound(format!("doctor {}", id)))
    }

    /// Case-insensitive match on name or specialty
    pub async fn search(&self, term: &str) -> ServiceResult<Vec<User>> {
        let needle = term.trim().to_lowercase();
        if needle.is_empty() {
            return Err(ServiceError::Validation("search term is required".to_string()));
        }

        let doctors = self.list(None).await?;
        Ok(doctors
            .into_iter()
            .filter(|doctor| {
                doctor.display_name.to_lowercase().contains(&needle)
                    || doctor
                        .specialty
                        .as_deref()
                        .map_or(false, |s| s.to_lowercase().contains(&needle))
            })
            .collect())
    }

    /// Patients the doctor has had appointments with
    pub async fn patients_of(&self, user: &UserInfo, doctor_id: &str) -> ServiceResult<Vec<User>> {
        if !user.is_self_or_admin(doctor_id) {
            return Err(forbidden("list this doctor's patients"));
        }

        let patient_ids: BTreeSet<String> = self
            .appointments
            .find(Query::new().where_eq("doctor_id", doctor_id))
            .await?
            .into_iter()
            .map(|a| a.patient_id)
            .collect();

        let mut patients = Vec::with_capacity(patient_ids.len());
        for id in patient_ids {
            if let Some(patient) = self.users.get(&id).await?.filter(|u| !u.deleted) {
                patients.push(patient);
            }
        }
        patients.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        Ok(patients)
    }

    /// Booked slots on one UTC day
    pub async fn schedule(&self, doctor_id: &str, day: NaiveDate) -> ServiceResult<Vec<BusySlot>> {
        self.get(doctor_id).await?;

        let start = day
            .and_hms_opt(0, 0, 0)
            .map(|midnight| Utc.from_utc_datetime(&midnight))
            .ok_or_else(|| ServiceError::Validation(format!("invalid day {}", day)))?;
        let end = start + Duration::days(1);

        let query = Query::new()
            .where_eq("doctor_id", doctor_id)
            .where_op("status", FilterOp::NotEq, AppointmentStatus::Cancelled.as_str())
            .where_date("scheduled_at", FilterOp::Gte, start)
            .where_date("scheduled_at", FilterOp::Lt, end)
            .order_by("scheduled_at", Direction::Asc);

        Ok(self
            .appointments
            .find(query)
            .await?
            .into_iter()
            .map(|a| BusySlot {
                starts_at: a.scheduled_at,
                ends_at: a.ends_at(),
                appointment_id: a.id,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::{user, user_info, TestStore};
    use care_hub_data::models::appointment::AppointmentKind;

    async fn seed_doctor(store: &TestStore, id: &str, name: &str, specialty: &str) {
        let mut doctor = user(id, Role::Doctor);
        doctor.display_name = name.to_string();
        doctor.specialty = Some(specialty.to_string());
        Collection::<User>::new(store.dyn_store()).create(doctor).await.unwrap();
    }

    async fn seed_appointment(store: &TestStore, id: &str, patient: &str, doctor: &str, at: DateTime<Utc>, status: AppointmentStatus) {
        let now = Utc::now();
        Collection::<Appointment>::new(store.dyn_store())
            .create(Appointment {
                id: id.to_string(),
                patient_id: patient.to_string(),
                doctor_id: doctor.to_string(),
                scheduled_at: at,
                duration_minutes: 30,
                kind: AppointmentKind::InPerson,
                status,
                reason: "Checkup".to_string(),
                notes: None,
                video_room: None,
                cancellation_reason: None,
                created_by: patient.to_string(),
                created_at: now,
                updated_at: now,
                cancelled_at: None,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_list_and_search_doctors() {
        let store = TestStore::new();
        seed_doctor(&store, "d1", "Dr. Zhao", "Cardiology").await;
        seed_doctor(&store, "d2", "Dr. Abara", "Dermatology").await;
        Collection::<User>::new(store.dyn_store()).create(user("p1", Role::Patient)).await.unwrap();
        let service = DoctorService::new(store.dyn_store());

        let names: Vec<String> = service.list(None).await.unwrap().into_iter().map(|d| d.display_name).collect();
        assert_eq!(names, vec!["Dr. Abara", "Dr. Zhao"]);
        assert_eq!(service.list(Some("Cardiology")).await.unwrap().len(), 1);

        let found = service.search("CARDIO").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "d1");
        assert_eq!(service.search("abara").await.unwrap()[0].id, "d2");
        assert!(matches!(service.search("  ").await, Err(ServiceError::Validation(_))));

        assert!(matches!(service.get("p1").await, Err(ServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_schedule_skips_cancelled_and_other_days() {
        let store = TestStore::new();
        seed_doctor(&store, "d1", "Dr. Zhao", "Cardiology").await;
        let day = NaiveDate::from_ymd_opt(2030, 5, 14).unwrap();
        seed_appointment(&store, "a1", "p1", "d1", Utc.with_ymd_and_hms(2030, 5, 14, 15, 0, 0).unwrap(), AppointmentStatus::Confirmed).await;
        seed_appointment(&store, "a2", "p2", "d1", Utc.with_ymd_and_hms(2030, 5, 14, 9, 0, 0).unwrap(), AppointmentStatus::Scheduled).await;
        seed_appointment(&store, "a3", "p1", "d1", Utc.with_ymd_and_hms(2030, 5, 14, 11, 0, 0).unwrap(), AppointmentStatus::Cancelled).await;
        seed_appointment(&store, "a4", "p1", "d1", Utc.with_ymd_and_hms(2030, 5, 15, 9, 0, 0).unwrap(), AppointmentStatus::Scheduled).await;
        let service = DoctorService::new(store.dyn_store());

        let slots = service.schedule("d1", day).await.unwrap();
        let ids: Vec<&str> = slots.iter().map(|s| s.appointment_id.as_str()).collect();
        assert_eq!(ids, vec!["a2", "a1"]);
        assert_eq!(slots[0].ends_at - slots[0].starts_at, Duration::minutes(30));

        assert!(matches!(service.schedule("nobody", day).await, Err(ServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_patients_of_is_distinct_and_restricted() {
        let store = TestStore::new();
        seed_doctor(&store, "d1", "Dr. Zhao", "Cardiology").await;
        let users = Collection::<User>::new(store.dyn_store());
        users.create(user("p1", Role::Patient)).await.unwrap();
        users.create(user("p2", Role::Patient)).await.unwrap();
        let at = Utc.with_ymd_and_hms(2030, 5, 14, 9, 0, 0).unwrap();
        seed_appointment(&store, "a1", "p1", "d1", at, AppointmentStatus::Completed).await;
        seed_appointment(&store, "a2", "p1", "d1", at + Duration::days(7), AppointmentStatus::Scheduled).await;
        seed_appointment(&store, "a3", "p2", "d1", at + Duration::days(1), AppointmentStatus::Scheduled).await;
        seed_appointment(&store, "a4", "p3", "d2", at, AppointmentStatus::Scheduled).await;
        let service = DoctorService::new(store.dyn_store());

        let ids: Vec<String> = service
            .patients_of(&user_info("d1", Role::Doctor), "d1")
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(ids, vec!["p1", "p2"]);

        assert!(service.patients_of(&user_info("a1", Role::Admin), "d1").await.is_ok());
        assert!(matches!(
            service.patients_of(&user_info("d2", Role::Doctor), "d1").await,
            Err(ServiceError::Forbidden(_))
        ));
    }
}
