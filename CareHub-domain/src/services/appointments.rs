//! Appointment booking and lifecycle.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, info, instrument};
use uuid::Uuid;
use validator::Validate;

#[cfg(feature = "with-api")]
use utoipa::{IntoParams, ToSchema};

use care_hub_data::models::appointment::{Appointment, AppointmentKind, AppointmentStatus};
use care_hub_data::models::user::{Role, User};
use care_hub_data::repository::Subscription;
use care_hub_data::store::{timestamp_value, Direction, DocumentStore, FilterOp, Query};
use care_hub_data::{Collection, Entity, Page, PageRequest};

use crate::audit::{AuditLogger, SecurityEvent, SecurityEventType};
use crate::auth::UserInfo;
use crate::services::errors::{forbidden, ServiceError, ServiceResult};
use crate::services::telemedicine::TelemedicineService;

/// Longest bookable appointment
pub const MAX_DURATION_MINUTES: u32 = 240;

/// Request to book an appointment
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[cfg_attr(feature = "with-api", derive(ToSchema))]
pub struct BookAppointmentRequest {
    /// Patient; defaults to the caller when the caller is a patient
    #[serde(default)]
    pub patient_id: Option<String>,
    /// Doctor to see
    #[validate(length(min = 1, message = "is required"))]
    pub doctor_id: String,
    /// Start time
    pub scheduled_at: DateTime<Utc>,
    /// Length in minutes
    #[validate(range(min = 5, max = 240, message = "must be between 5 and 240 minutes"))]
    pub duration_minutes: u32,
    /// In person or video
    pub kind: AppointmentKind,
    /// Reason for the visit
    #[validate(length(min = 1, max = 500, message = "must be 1-500 characters"))]
    pub reason: String,
    /// Extra notes
    #[serde(default)]
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

/// Filters for appointment lists
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "with-api", derive(ToSchema, IntoParams))]
#[cfg_attr(feature = "with-api", into_params(parameter_in = Query))]
pub struct AppointmentFilter {
    /// Only appointments in this status
    pub status: Option<AppointmentStatus>,
    /// Starting at or after
    pub from: Option<DateTime<Utc>>,
    /// Starting before
    pub to: Option<DateTime<Utc>>,
}

impl AppointmentFilter {
    fn apply(&self, mut query: Query) -> Query {
        if let Some(status) = self.status {
            query = query.where_eq("status", status.as_str());
        }
        if let Some(from) = self.from {
            query = query.where_date("scheduled_at", FilterOp::Gte, from);
        }
        if let Some(to) = self.to {
            query = query.where_date("scheduled_at", FilterOp::Lt, to);
        }
        query
    }
}

/// Request to move an appointment
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[cfg_attr(feature = "with-api", derive(ToSchema))]
pub struct RescheduleRequest {
    /// New start time
    pub scheduled_at: DateTime<Utc>,
    /// New length, unchanged when absent
    #[validate(range(min = 5, max = 240, message = "must be between 5 and 240 minutes"))]
    pub duration_minutes: Option<u32>,
}

/// Request to change an appointment's status
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[cfg_attr(feature = "with-api", derive(ToSchema))]
pub struct UpdateStatusRequest {
    /// Target status
    pub status: AppointmentStatus,
    /// Notes to store with the change
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

/// Request to cancel an appointment
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[cfg_attr(feature = "with-api", derive(ToSchema))]
pub struct CancelRequest {
    /// Why the appointment is cancelled
    #[validate(length(max = 500))]
    pub reason: Option<String>,
}

/// Appointment service
#[derive(Clone)]
pub struct AppointmentService {
    appointments: Collection<Appointment>,
    users: Collection<User>,
    telemedicine: TelemedicineService,
    audit: AuditLogger,
}

impl AppointmentService {
    pub fn new(store: Arc<dyn DocumentStore>, telemedicine: TelemedicineService, audit: AuditLogger) -> Self {
        Self {
            appointments: Collection::new(store.clone()),
            users: Collection::new(store),
            telemedicine,
            audit,
        }
    }

    /// Book an appointment with a doctor
    #[instrument(skip(self, user, request), fields(user_id = %user.user_id))]
    pub async fn book(&self, user: &UserInfo, request: BookAppointmentRequest) -> ServiceResult<Appointment> {
        request.validate()?;

        let patient_id = match (user.role, request.patient_id.as_deref()) {
            (Role::Patient, None) => user.user_id.clone(),
            (Role::Patient, Some(id)) if id == user.user_id => user.user_id.clone(),
            (Role::Patient, Some(_)) => return Err(forbidden("book for another patient")),
            (_, Some(id)) if !id.is_empty() => id.to_string(),
            (_, _) => return Err(ServiceError::Validation("patient_id is required".to_string())),
        };

        let now = Utc::now();
        if request.scheduled_at <= now {
            return Err(ServiceError::Validation("appointment must be in the future".to_string()));
        }

        let doctor = self
            .users
            .get(&request.doctor_id)
            .await?
            .filter(|u| !u.deleted)
            .ok_or_else(|| ServiceError::NotFound(format!("doctor {}", request.doctor_id)))?;
        if doctor.role != Role::Doctor {
            return Err(ServiceError::Validation(format!("user {} is not a doctor", doctor.id)));
        }

        let end = request.scheduled_at + Duration::minutes(i64::from(request.duration_minutes));
        self.ensure_doctor_free(&doctor.id, request.scheduled_at, end, None).await?;

        let id = Uuid::new_v4().to_string();
        let video_room = match request.kind {
            AppointmentKind::Video => Some(self.telemedicine.create_room(&id)),
            AppointmentKind::InPerson => None,
        };

        let appointment = self
            .appointments
            .create(Appointment {
                id,
                patient_id,
                doctor_id: doctor.id,
                scheduled_at: request.scheduled_at,
                duration_minutes: request.duration_minutes,
                kind: request.kind,
                status: AppointmentStatus::Scheduled,
                reason: request.reason,
                notes: request.notes,
                video_room,
                cancellation_reason: None,
                created_by: user.user_id.clone(),
                created_at: now,
                updated_at: now,
                cancelled_at: None,
            })
            .await?;

        info!("Booked appointment {} for patient {}", appointment.id, appointment.patient_id);
        self.audit
            .log(
                SecurityEvent::success(SecurityEventType::AppointmentCreated, &user.user_id)
                    .with_resource(resource(&appointment.id)),
            )
            .await;

        Ok(appointment)
    }

    /// Fetch one appointment visible to the caller
    pub async fn get(&self, user: &UserInfo, id: &str) -> ServiceResult<Appointment> {
        let appointment = self.appointments.require(id).await?;
        ensure_participant(user, &appointment)?;
        Ok(appointment)
    }

    /// A patient's appointments in ascending time order
    pub async fn list_for_patient(
        &self,
        user: &UserInfo,
        patient_id: &str,
        filter: &AppointmentFilter,
        page: &PageRequest,
    ) -> ServiceResult<Page<Appointment>> {
        if !user.can_access_patient(patient_id) {
            return Err(forbidden("view these appointments"));
        }
        let query = filter
            .apply(Query::new().where_eq("patient_id", patient_id))
            .order_by("scheduled_at", Direction::Asc);
        Ok(self.appointments.page(query, page).await?)
    }

    /// A doctor's appointments in ascending time order
    pub async fn list_for_doctor(
        &self,
        user: &UserInfo,
        doctor_id: &str,
        filter: &AppointmentFilter,
        page: &PageRequest,
    ) -> ServiceResult<Page<Appointment>> {
        if !user.is_self_or_admin(doctor_id) {
            return Err(forbidden("view this doctor's appointments"));
        }
        let query = filter
            .apply(Query::new().where_eq("doctor_id", doctor_id))
            .order_by("scheduled_at", Direction::Asc);
        Ok(self.appointments.page(query, page).await?)
    }

    /// Next scheduled or confirmed appointments of the caller
    pub async fn upcoming(&self, user: &UserInfo, limit: usize) -> ServiceResult<Vec<Appointment>> {
        let owner_field = if user.is_doctor() { "doctor_id" } else { "patient_id" };
        let query = Query::new()
            .where_eq(owner_field, user.user_id.as_str())
            .where_in(
                "status",
                vec![
                    AppointmentStatus::Scheduled.as_str().into(),
                    AppointmentStatus::Confirmed.as_str().into(),
                ],
            )
            .where_date("scheduled_at", FilterOp::Gte, Utc::now())
            .order_by("scheduled_at", Direction::Asc)
            .limit(limit.clamp(1, 50));
        Ok(self.appointments.find(query).await?)
    }

    /// Move an appointment to a new status
    #[instrument(skip(self, user, request), fields(user_id = %user.user_id))]
    pub async fn update_status(
        &self,
        user: &UserInfo,
        id: &str,
        request: UpdateStatusRequest,
    ) -> ServiceResult<Appointment> {
        request.validate()?;
        if request.status == AppointmentStatus::Cancelled {
            return self.cancel(user, id, CancelRequest { reason: request.notes }).await;
        }

        let appointment = self.appointments.require(id).await?;
        let allowed = user.is_admin() || (user.is_doctor() && user.user_id == appointment.doctor_id);
        if !allowed {
            return Err(forbidden("change appointment status"));
        }
        ensure_transition(&appointment, request.status)?;

        let mut patch = Map::new();
        patch.insert("status".to_string(), json!(request.status));
        patch.insert("updated_at".to_string(), timestamp_value(Utc::now()));
        if let Some(notes) = request.notes {
            patch.insert("notes".to_string(), Value::String(notes));
        }

        let updated = self.appointments.update(id, Value::Object(patch)).await?;
        debug!("Appointment {} is now {}", id, updated.status.as_str());
        self.audit
            .log(
                SecurityEvent::success(SecurityEventType::AppointmentUpdated, &user.user_id)
                    .with_resource(resource(id))
                    .with_details(format!("status -> {}", updated.status.as_str())),
            )
            .await;
        Ok(updated)
    }

    /// Move an appointment to a new time
    #[instrument(skip(self, user, request), fields(user_id = %user.user_id))]
    pub async fn reschedule(&self, user: &UserInfo, id: &str, request: RescheduleRequest) -> ServiceResult<Appointment> {
        request.validate()?;

        let appointment = self.appointments.require(id).await?;
        ensure_participant(user, &appointment)?;
        if appointment.status.is_terminal() {
            return Err(ServiceError::Conflict(format!(
                "cannot reschedule a {} appointment",
                appointment.status.as_str()
            )));
        }
        if request.scheduled_at <= Utc::now() {
            return Err(ServiceError::Validation("appointment must be in the future".to_string()));
        }

        let duration = request.duration_minutes.unwrap_or(appointment.duration_minutes);
        let end = request.scheduled_at + Duration::minutes(i64::from(duration));
        self.ensure_doctor_free(&appointment.doctor_id, request.scheduled_at, end, Some(id))
            .await?;

        // A moved appointment needs to be confirmed again
        let updated = self
            .appointments
            .update(
                id,
                json!({
                    "scheduled_at": timestamp_value(request.scheduled_at),
                    "duration_minutes": duration,
                    "status": AppointmentStatus::Scheduled,
                    "updated_at": timestamp_value(Utc::now()),
                }),
            )
            .await?;

        self.audit
            .log(
                SecurityEvent::success(SecurityEventType::AppointmentUpdated, &user.user_id)
                    .with_resource(resource(id))
                    .with_details(format!("rescheduled to {}", request.scheduled_at.to_rfc3339())),
            )
            .await;
        Ok(updated)
    }

    /// Cancel an appointment
    #[instrument(skip(self, user, request), fields(user_id = %user.user_id))]
    pub async fn cancel(&self, user: &UserInfo, id: &str, request: CancelRequest) -> ServiceResult<Appointment> {
        request.validate()?;

        let appointment = self.appointments.require(id).await?;
        ensure_participant(user, &appointment)?;
        ensure_transition(&appointment, AppointmentStatus::Cancelled)?;

        let now = timestamp_value(Utc::now());
        let updated = self
            .appointments
            .update(
                id,
                json!({
                    "status": AppointmentStatus::Cancelled,
                    "cancellation_reason": request.reason,
                    "cancelled_at": now,
                    "updated_at": now,
                }),
            )
            .await?;

        info!("Cancelled appointment {}", id);
        self.audit
            .log(
                SecurityEvent::success(SecurityEventType::AppointmentCancelled, &user.user_id)
                    .with_resource(resource(id)),
            )
            .await;
        Ok(updated)
    }

    /// Live changes to a patient's appointments
    pub fn watch_for_patient(&self, user: &UserInfo, patient_id: &str) -> ServiceResult<Subscription<Appointment>> {
        if !user.can_access_patient(patient_id) {
            return Err(forbidden("watch these appointments"));
        }
        Ok(self.appointments.watch(Query::new().where_eq("patient_id", patient_id)))
    }

    async fn ensure_doctor_free(
        &self,
        doctor_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        ignore_id: Option<&str>,
    ) -> ServiceResult<()> {
        // Anything starting later than MAX_DURATION before `start` may still be running
        let query = Query::new()
            .where_eq("doctor_id", doctor_id)
            .where_op("status", FilterOp::NotEq, AppointmentStatus::Cancelled.as_str())
            .where_date("scheduled_at", FilterOp::Gt, start - Duration::minutes(i64::from(MAX_DURATION_MINUTES)))
            .where_date("scheduled_at", FilterOp::Lt, end);

        let clash = self
            .appointments
            .find(query)
            .await?
            .into_iter()
            .filter(|a| Some(a.id.as_str()) != ignore_id)
            .find(|a| a.overlaps(start, end));

        match clash {
            Some(existing) => Err(ServiceError::Conflict(format!(
                "doctor already has appointment {} at {}",
                existing.id,
                existing.scheduled_at.to_rfc3339()
            ))),
            None => Ok(()),
        }
    }
}

fn resource(id: &str) -> String {
    format!("{}/{}", Appointment::COLLECTION, id)
}

fn ensure_participant(user: &UserInfo, appointment: &Appointment) -> ServiceResult<()> {
    let allowed = match user.role {
        Role::Admin => true,
        Role::Doctor => user.can_access_patient(&appointment.patient_id),
        Role::Patient => user.user_id == appointment.patient_id,
    };
    if allowed {
        Ok(())
    } else {
        Err(forbidden("access this appointment"))
    }
}

fn ensure_transition(appointment: &Appointment, next: AppointmentStatus) -> ServiceResult<()> {
    if appointment.status.can_transition_to(next) {
        Ok(())
    } else {
        Err(ServiceError::Conflict(format!(
            "cannot change appointment from {} to {}",
            appointment.status.as_str(),
            next.as_str()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::{seed_user, user_info, TestStore};
    use care_hub_data::repository::Change;

    fn service(store: &TestStore) -> AppointmentService {
        let telemedicine = TelemedicineService::new(store.dyn_store(), "https://meet.example");
        AppointmentService::new(store.dyn_store(), telemedicine, store.audit())
    }

    fn request(doctor_id: &str, hours_ahead: i64, kind: AppointmentKind) -> BookAppointmentRequest {
        BookAppointmentRequest {
            patient_id: None,
            doctor_id: doctor_id.to_string(),
            scheduled_at: Utc::now() + Duration::hours(hours_ahead),
            duration_minutes: 30,
            kind,
            reason: "Annual checkup".to_string(),
            notes: None,
        }
    }

    #[tokio::test]
    async fn test_book_stamps_metadata_and_logs() {
        let store = TestStore::new();
        seed_user(&store, "d1", Role::Doctor).await;
        let service = service(&store);
        let patient = user_info("p1", Role::Patient);

        let appointment = service.book(&patient, request("d1", 24, AppointmentKind::Video)).await.unwrap();
        assert_eq!(appointment.patient_id, "p1");
        assert_eq!(appointment.created_by, "p1");
        assert_eq!(appointment.status, AppointmentStatus::Scheduled);
        assert!(appointment.video_room.is_some());

        let events = store.audit().recent_events(Some("p1"), 10).await.unwrap();
        assert_eq!(events[0].event_type, "APPOINTMENT_CREATED");
        assert_eq!(events[0].resource, Some(format!("appointments/{}", appointment.id)));
    }

    #[tokio::test]
    async fn test_book_validation() {
        let store = TestStore::new();
        seed_user(&store, "d1", Role::Doctor).await;
        seed_user(&store, "p2", Role::Patient).await;
        let service = service(&store);
        let patient = user_info("p1", Role::Patient);

        let past = request("d1", -1, AppointmentKind::InPerson);
        assert!(matches!(service.book(&patient, past).await, Err(ServiceError::Validation(_))));

        let mut too_long = request("d1", 5, AppointmentKind::InPerson);
        too_long.duration_minutes = 300;
        assert!(matches!(service.book(&patient, too_long).await, Err(ServiceError::Validation(_))));

        let not_a_doctor = request("p2", 5, AppointmentKind::InPerson);
        assert!(matches!(service.book(&patient, not_a_doctor).await, Err(ServiceError::Validation(_))));

        let unknown = request("nobody", 5, AppointmentKind::InPerson);
        assert!(matches!(service.book(&patient, unknown).await, Err(ServiceError::NotFound(_))));

        let mut for_other = request("d1", 5, AppointmentKind::InPerson);
        for_other.patient_id = Some("p2".into());
        assert!(matches!(service.book(&patient, for_other).await, Err(ServiceError::Forbidden(_))));

        let doctor = user_info("d1", Role::Doctor);
        let missing_patient = request("d1", 5, AppointmentKind::InPerson);
        assert!(matches!(service.book(&doctor, missing_patient).await, Err(ServiceError::Validation(_))));
    }

    #[tokio::test]
    async fn test_overlapping_booking_conflicts_until_cancelled() {
        let store = TestStore::new();
        seed_user(&store, "d1", Role::Doctor).await;
        let service = service(&store);
        let patient = user_info("p1", Role::Patient);

        let first = service.book(&patient, request("d1", 48, AppointmentKind::InPerson)).await.unwrap();

        let mut overlapping = request("d1", 48, AppointmentKind::InPerson);
        overlapping.scheduled_at = first.scheduled_at + Duration::minutes(15);
        assert!(matches!(
            service.book(&user_info("p2", Role::Patient), overlapping.clone()).await,
            Err(ServiceError::Conflict(_))
        ));

        let mut adjacent = overlapping.clone();
        adjacent.scheduled_at = first.ends_at();
        assert!(service.book(&user_info("p3", Role::Patient), adjacent).await.is_ok());

        service.cancel(&patient, &first.id, CancelRequest::default()).await.unwrap();
        let mut retry = overlapping;
        retry.duration_minutes = 15;
        assert!(service.book(&user_info("p2", Role::Patient), retry).await.is_ok());
    }

    #[tokio::test]
    async fn test_status_transitions_are_enforced() {
        let store = TestStore::new();
        seed_user(&store, "d1", Role::Doctor).await;
        let service = service(&store);
        let patient = user_info("p1", Role::Patient);
        let doctor = user_info("d1", Role::Doctor);

        let appointment = service.book(&patient, request("d1", 3, AppointmentKind::InPerson)).await.unwrap();

        let confirm = UpdateStatusRequest { status: AppointmentStatus::Confirmed, notes: None };
        assert!(matches!(
            service.update_status(&patient, &appointment.id, confirm.clone()).await,
            Err(ServiceError::Forbidden(_))
        ));
        let confirmed = service.update_status(&doctor, &appointment.id, confirm).await.unwrap();
        assert_eq!(confirmed.status, AppointmentStatus::Confirmed);

        let done = UpdateStatusRequest { status: AppointmentStatus::Completed, notes: Some("All good".into()) };
        let completed = service.update_status(&doctor, &appointment.id, done).await.unwrap();
        assert_eq!(completed.notes.as_deref(), Some("All good"));

        assert!(matches!(
            service.cancel(&patient, &appointment.id, CancelRequest::default()).await,
            Err(ServiceError::Conflict(_))
        ));
        let reschedule = RescheduleRequest { scheduled_at: Utc::now() + Duration::days(3), duration_minutes: None };
        assert!(matches!(
            service.reschedule(&patient, &appointment.id, reschedule).await,
            Err(ServiceError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_cancel_records_reason() {
        let store = TestStore::new();
        seed_user(&store, "d1", Role::Doctor).await;
        let service = service(&store);
        let patient = user_info("p1", Role::Patient);

        let appointment = service.book(&patient, request("d1", 3, AppointmentKind::InPerson)).await.unwrap();
        let cancelled = service
            .cancel(&patient, &appointment.id, CancelRequest { reason: Some("Feeling better".into()) })
            .await
            .unwrap();
        assert_eq!(cancelled.status, AppointmentStatus::Cancelled);
        assert_eq!(cancelled.cancellation_reason.as_deref(), Some("Feeling better"));
        assert!(cancelled.cancelled_at.is_some());

        let other = user_info("p2", Role::Patient);
        assert!(matches!(service.get(&other, &appointment.id).await, Err(ServiceError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_reschedule_resets_confirmation() {
        let store = TestStore::new();
        seed_user(&store, "d1", Role::Doctor).await;
        let service = service(&store);
        let patient = user_info("p1", Role::Patient);
        let doctor = user_info("d1", Role::Doctor);

        let appointment = service.book(&patient, request("d1", 3, AppointmentKind::InPerson)).await.unwrap();
        service
            .update_status(&doctor, &appointment.id, UpdateStatusRequest { status: AppointmentStatus::Confirmed, notes: None })
            .await
            .unwrap();

        let new_time = Utc::now() + Duration::days(2);
        let moved = service
            .reschedule(&patient, &appointment.id, RescheduleRequest { scheduled_at: new_time, duration_minutes: Some(45) })
            .await
            .unwrap();
        assert_eq!(moved.status, AppointmentStatus::Scheduled);
        assert_eq!(moved.duration_minutes, 45);
        assert_eq!(moved.scheduled_at.timestamp(), new_time.timestamp());
    }

    #[tokio::test]
    async fn test_filters_and_pages() {
        let store = TestStore::new();
        seed_user(&store, "d1", Role::Doctor).await;
        let service = service(&store);
        let patient = user_info("p1", Role::Patient);

        let mut ids = Vec::new();
        for day in 1..=5 {
            let appointment = service.book(&patient, request("d1", day * 24, AppointmentKind::InPerson)).await.unwrap();
            ids.push(appointment.id);
        }
        service.cancel(&patient, &ids[1], CancelRequest::default()).await.unwrap();

        let first = service
            .list_for_patient(&patient, "p1", &AppointmentFilter::default(), &PageRequest::first(2))
            .await
            .unwrap();
        assert_eq!(first.items.iter().map(|a| a.id.clone()).collect::<Vec<_>>(), ids[0..2].to_vec());
        assert!(first.has_more);

        let second = service
            .list_for_patient(
                &patient,
                "p1",
                &AppointmentFilter::default(),
                &PageRequest::after(2, first.next_cursor.clone().unwrap()),
            )
            .await
            .unwrap();
        assert_eq!(second.items[0].id, ids[2]);

        let cancelled = AppointmentFilter { status: Some(AppointmentStatus::Cancelled), ..Default::default() };
        let page = service
            .list_for_patient(&patient, "p1", &cancelled, &PageRequest::default())
            .await
            .unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].id, ids[1]);

        let window = AppointmentFilter {
            status: None,
            from: Some(Utc::now() + Duration::hours(36)),
            to: Some(Utc::now() + Duration::hours(84)),
        };
        let page = service.list_for_patient(&patient, "p1", &window, &PageRequest::default()).await.unwrap();
        assert_eq!(page.items.len(), 2);

        let upcoming = service.upcoming(&patient, 10).await.unwrap();
        assert_eq!(upcoming.len(), 4);
        let doctor_view = service.upcoming(&user_info("d1", Role::Doctor), 2).await.unwrap();
        assert_eq!(doctor_view.len(), 2);

        assert!(matches!(
            service
                .list_for_patient(&user_info("p2", Role::Patient), "p1", &AppointmentFilter::default(), &PageRequest::default())
                .await,
            Err(ServiceError::Forbidden(_))
        ));
        assert!(matches!(
            service
                .list_for_doctor(&user_info("d2", Role::Doctor), "d1", &AppointmentFilter::default(), &PageRequest::default())
                .await,
            Err(ServiceError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_watch_for_patient_sees_only_own_changes() {
        let store = TestStore::new();
        seed_user(&store, "d1", Role::Doctor).await;
        let service = service(&store);
        let patient = user_info("p1", Role::Patient);

        let mut subscription = service.watch_for_patient(&patient, "p1").unwrap();
        service
            .book(&user_info("p2", Role::Patient), request("d1", 10, AppointmentKind::InPerson))
            .await
            .unwrap();
        let mine = service.book(&patient, request("d1", 20, AppointmentKind::InPerson)).await.unwrap();

        match subscription.next().await {
            Some(Change::Added(appointment)) => assert_eq!(appointment.id, mine.id),
            other => panic!("unexpected change: {:?}", other),
        }
    }
}
