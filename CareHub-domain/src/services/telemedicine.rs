//! Video rooms for telemedicine appointments.
//!
//! The video provider is external; CareHub only mints unguessable room names
//! below the provider's base URL and decides who may join.

use std::sync::Arc;

use rand::distributions::Alphanumeric;
use rand::Rng;
use tracing::{debug, info, warn};

use care_hub_data::models::appointment::{Appointment, AppointmentKind, AppointmentStatus, VideoRoom};
use care_hub_data::store::DocumentStore;
use care_hub_data::Collection;

use crate::auth::UserInfo;
use crate::services::errors::{forbidden, ServiceError, ServiceResult};

const ROOM_TOKEN_LENGTH: usize = 24;

/// Creates and hands out video rooms
#[derive(Clone)]
pub struct TelemedicineService {
    appointments: Collection<Appointment>,
    base_url: String,
}

impl TelemedicineService {
    pub fn new(store: Arc<dyn DocumentStore>, base_url: &str) -> Self {
        Self {
            appointments: Collection::new(store),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Mint a room for an appointment
    pub fn create_room(&self, appointment_id: &str) -> VideoRoom {
        let token: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(ROOM_TOKEN_LENGTH)
            .map(char::from)
            .collect();
        let prefix: String = appointment_id.chars().filter(|c| c.is_ascii_alphanumeric()).take(8).collect();
        let room_name = format!("CareHub-{}-{}", prefix, token);

        debug!("Created video room {} for appointment {}", room_name, appointment_id);
        VideoRoom {
            join_url: format!("{}/{}", self.base_url, room_name),
            embed_url: format!("{}/{}#config.prejoinPageEnabled=false", self.base_url, room_name),
            room_name,
        }
    }

    /// Room of a video appointment, for its patient or doctor
    pub async fn join(&self, user: &UserInfo, appointment_id: &str) -> ServiceResult<VideoRoom> {
        let appointment = self.appointments.require(appointment_id).await?;

        if user.user_id != appointment.patient_id && user.user_id != appointment.doctor_id {
            return Err(forbidden("join this video appointment"));
        }
        if appointment.kind != AppointmentKind::Video {
            return Err(ServiceError::Validation("appointment is not a video appointment".to_string()));
        }
        if matches!(appointment.status, AppointmentStatus::Cancelled | AppointmentStatus::NoShow) {
            return Err(ServiceError::Conflict(format!(
                "appointment is {}",
                appointment.status.as_str()
            )));
        }

        // Video appointments get their room when booked
        let room = appointment.video_room.ok_or_else(|| {
            warn!("Video appointment {} has no room", appointment.id);
            ServiceError::Conflict("appointment has no video room".to_string())
        })?;

        info!("User {} joining video room {}", user.user_id, room.room_name);
        Ok(room)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use care_hub_data::store::InMemoryDocumentStore;
    use chrono::{Duration, Utc};

    fn appointment(kind: AppointmentKind, status: AppointmentStatus) -> Appointment {
        let now = Utc::now();
        Appointment {
            id: "appt-1".into(),
            patient_id: "p1".into(),
            doctor_id: "d1".into(),
            scheduled_at: now + Duration::hours(2),
            duration_minutes: 30,
            kind,
            status,
            reason: "follow-up".into(),
            notes: None,
            video_room: None,
            cancellation_reason: None,
            created_by: "p1".into(),
            created_at: now,
            updated_at: now,
            cancelled_at: None,
        }
    }

    fn user(id: &str, role: Role) -> UserInfo {
        UserInfo { user_id: id.into(), role, email: None }
    }

    #[test]
    fn test_rooms_are_unique_and_below_base_url() {
        let service = TelemedicineService::new(Arc::new(InMemoryDocumentStore::new()), "https://meet.example/");
        let a = service.create_room("appt-1");
        let b = service.create_room("appt-1");
        assert_ne!(a.room_name, b.room_name);
        assert!(a.join_url.starts_with("https://meet.example/CareHub-appt1-"));
        assert!(a.embed_url.starts_with(&a.join_url));
    }

    #[tokio::test]
    async fn test_only_participants_join_active_video_appointments() {
        let store: Arc<dyn DocumentStore> = Arc::new(InMemoryDocumentStore::new());
        let service = TelemedicineService::new(store.clone(), "https://meet.example");
        let appointments: Collection<Appointment> = Collection::new(store);
        let mut video = appointment(AppointmentKind::Video, AppointmentStatus::Confirmed);
        let booked = service.create_room(&video.id);
        video.video_room = Some(booked.clone());
        appointments.create(video).await.unwrap();

        let room = service.join(&user("p1", Role::Patient), "appt-1").await.unwrap();
        let again = service.join(&user("d1", Role::Doctor), "appt-1").await.unwrap();
        assert_eq!(room, booked);
        assert_eq!(room, again);

        assert!(matches!(
            service.join(&user("a1", Role::Admin), "appt-1").await,
            Err(ServiceError::Forbidden(_))
        ));
        assert!(matches!(
            service.join(&user("p1", Role::Patient), "missing").await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_join_rejects_in_person_and_cancelled() {
        let store: Arc<dyn DocumentStore> = Arc::new(InMemoryDocumentStore::new());
        let service = TelemedicineService::new(store.clone(), "https://meet.example");
        let appointments: Collection<Appointment> = Collection::new(store);

        appointments
            .create(appointment(AppointmentKind::InPerson, AppointmentStatus::Scheduled))
            .await
            .unwrap();
        assert!(matches!(
            service.join(&user("p1", Role::Patient), "appt-1").await,
            Err(ServiceError::Validation(_))
        ));

        let mut cancelled = appointment(AppointmentKind::Video, AppointmentStatus::Cancelled);
        cancelled.id = "appt-2".into();
        appointments.create(cancelled).await.unwrap();
        assert!(matches!(
            service.join(&user("p1", Role::Patient), "appt-2").await,
            Err(ServiceError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_join_without_booked_room_is_a_conflict() {
        let store: Arc<dyn DocumentStore> = Arc::new(InMemoryDocumentStore::new());
        let service = TelemedicineService::new(store.clone(), "https://meet.example");
        let appointments: Collection<Appointment> = Collection::new(store);
        appointments
            .create(appointment(AppointmentKind::Video, AppointmentStatus::Scheduled))
            .await
            .unwrap();

        assert!(matches!(
            service.join(&user("p1", Role::Patient), "appt-1").await,
            Err(ServiceError::Conflict(_))
        ));
        let stored = appointments.require("appt-1").await.unwrap();
        assert!(stored.video_room.is_none());
    }
}
