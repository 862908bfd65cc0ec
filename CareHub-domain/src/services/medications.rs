//! Medication schedules, dose reminders and adherence.
//!
//! Schedule times are `HH:MM` in UTC. A dose is identified by its medication
//! and scheduled time, so logging the same dose twice is rejected.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, info, instrument};
use validator::Validate;

#[cfg(feature = "with-api")]
use utoipa::ToSchema;

use care_hub_data::models::medication::{DoseLog, DoseStatus, Medication};
use care_hub_data::store::{timestamp_value, Direction, DocumentStore, FilterOp, Query};
use care_hub_data::{Collection, Entity};

use crate::audit::{AuditLogger, SecurityEvent, SecurityEventType};
use crate::auth::UserInfo;
use crate::services::errors::{forbidden, ServiceError, ServiceResult};

/// Longest adherence window
pub const MAX_ADHERENCE_DAYS: i64 = 366;

/// Request to add a medication
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[cfg_attr(feature = "with-api", derive(ToSchema))]
pub struct AddMedicationRequest {
    /// Patient; defaults to the caller
    #[serde(default)]
    pub patient_id: Option<String>,
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(min = 1, max = 100))]
    pub dosage: String,
    #[serde(default)]
    #[validate(length(max = 1000))]
    pub instructions: Option<String>,
    /// Daily intake times as `HH:MM`
    #[validate(length(min = 1, max = 24, message = "must list 1-24 daily times"))]
    pub schedule: Vec<String>,
    pub start_date: NaiveDate,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default = "default_true")]
    pub reminders_enabled: bool,
}

fn default_true() -> bool {
    true
}

/// Partial medication update
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[cfg_attr(feature = "with-api", derive(ToSchema))]
pub struct UpdateMedicationRequest {
    #[validate(length(min = 1, max = 100))]
    pub dosage: Option<String>,
    #[validate(length(max = 1000))]
    pub instructions: Option<String>,
    #[validate(length(min = 1, max = 24))]
    pub schedule: Option<Vec<String>>,
    pub end_date: Option<NaiveDate>,
    pub reminders_enabled: Option<bool>,
}

/// Request to log a dose
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "with-api", derive(ToSchema))]
pub struct LogDoseRequest {
    /// Scheduled time of the dose being logged
    pub scheduled_for: DateTime<Utc>,
    pub status: DoseStatus,
}

/// A dose due soon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "with-api", derive(ToSchema))]
pub struct DoseReminder {
    pub medication_id: String,
    pub name: String,
    pub dosage: String,
    pub due_at: DateTime<Utc>,
}

/// Taken versus scheduled doses over a period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "with-api", derive(ToSchema))]
pub struct AdherenceReport {
    pub patient_id: String,
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub scheduled: usize,
    pub taken: usize,
    pub skipped: usize,
    /// Share of scheduled doses taken; absent when nothing was scheduled
    pub percentage: Option<f64>,
}

#[derive(Clone)]
pub struct MedicationService {
    medications: Collection<Medication>,
    doses: Collection<DoseLog>,
    audit: AuditLogger,
}

impl MedicationService {
    pub fn new(store: Arc<dyn DocumentStore>, audit: AuditLogger) -> Self {
        Self {
            medications: Collection::new(store.clone()),
            doses: Collection::new(store),
            audit,
        }
    }

    #[instrument(skip(self, user, request), fields(user_id = %user.user_id))]
    pub async fn add(&self, user: &UserInfo, request: AddMedicationRequest) -> ServiceResult<Medication> {
        request.validate()?;

        let patient_id = request.patient_id.unwrap_or_else(|| user.user_id.clone());
        if !user.can_access_patient(&patient_id) {
            return Err(forbidden("add medications for another patient"));
        }
        let schedule = normalize_schedule(&request.schedule)?;
        ensure_date_range(request.start_date, request.end_date)?;

        let now = Utc::now();
        let medication = self
            .medications
            .create(Medication {
                id: String::new(),
                patient_id,
                prescribed_by: user.is_doctor().then(|| user.user_id.clone()),
                name: request.name,
                dosage: request.dosage,
                instructions: request.instructions,
                schedule,
                start_date: request.start_date,
                end_date: request.end_date,
                reminders_enabled: request.reminders_enabled,
                active: true,
                created_at: now,
                updated_at: now,
            })
            .await?;

        info!("Added medication {} for patient {}", medication.id, medication.patient_id);
        self.audit
            .log(
                SecurityEvent::success(SecurityEventType::MedicationCreated, &user.user_id)
                    .with_resource(resource(&medication.id)),
            )
            .await;
        Ok(medication)
    }

    pub async fn get(&self, user: &UserInfo, id: &str) -> ServiceResult<Medication> {
        let medication = self.medications.require(id).await?;
        if !user.can_access_patient(&medication.patient_id) {
            return Err(forbidden("view this medication"));
        }
        Ok(medication)
    }

    /// A patient's medications by name
    pub async fn list(&self, user: &UserInfo, patient_id: &str, active_only: bool) -> ServiceResult<Vec<Medication>> {
        if !user.can_access_patient(patient_id) {
            return Err(forbidden("view these medications"));
        }
        let mut query = Query::new().where_eq("patient_id", patient_id);
        if active_only {
            query = query.where_eq("active", true);
        }
        Ok(self.medications.find(query.order_by("name", Direction::Asc)).await?)
    }

    pub async fn update(&self, user: &UserInfo, id: &str, request: UpdateMedicationRequest) -> ServiceResult<Medication> {
        request.validate()?;
        let existing = self.get(user, id).await?;

        let mut patch = Map::new();
        if let Some(dosage) = request.dosage {
            patch.insert("dosage".into(), Value::String(dosage));
        }
        if let Some(instructions) = request.instructions {
            patch.insert("instructions".into(), Value::String(instructions));
        }
        if let Some(schedule) = request.schedule {
            patch.insert("schedule".into(), json!(normalize_schedule(&schedule)?));
        }
        if let Some(end_date) = request.end_date {
            ensure_date_range(existing.start_date, Some(end_date))?;
            patch.insert("end_date".into(), json!(end_date));
        }
        if let Some(enabled) = request.reminders_enabled {
            patch.insert("reminders_enabled".into(), Value::Bool(enabled));
        }
        patch.insert("updated_at".into(), timestamp_value(Utc::now()));

        let updated = self.medications.update(id, Value::Object(patch)).await?;
        self.log_change(user, id, "updated").await;
        Ok(updated)
    }

    /// Stop a medication; its dose history is kept
    pub async fn deactivate(&self, user: &UserInfo, id: &str) -> ServiceResult<Medication> {
        self.get(user, id).await?;
        let updated = self
            .medications
            .update(id, json!({ "active": false, "updated_at": timestamp_value(Utc::now()) }))
            .await?;
        self.log_change(user, id, "deactivated").await;
        Ok(updated)
    }

    pub async fn remove(&self, user: &UserInfo, id: &str) -> ServiceResult<()> {
        self.get(user, id).await?;
        self.medications.delete(id).await?;
        self.log_change(user, id, "removed").await;
        Ok(())
    }

    /// Doses due in `[now, now + window]` that have not been logged yet
    pub async fn reminders_due(
        &self,
        user: &UserInfo,
        patient_id: &str,
        now: DateTime<Utc>,
        window: Duration,
    ) -> ServiceResult<Vec<DoseReminder>> {
        if !user.can_access_patient(patient_id) {
            return Err(forbidden("view these reminders"));
        }
        let until = now + window;

        let medications = self
            .medications
            .find(
                Query::new()
                    .where_eq("patient_id", patient_id)
                    .where_eq("active", true)
                    .where_eq("reminders_enabled", true),
            )
            .await?;
        let logged = self.logged_doses(patient_id, now, until).await?;

        let mut reminders: Vec<DoseReminder> = medications
            .iter()
            .flat_map(|medication| {
                occurrences(medication, now, until)
                    .into_iter()
                    .filter(|due_at| !logged.contains(&(medication.id.clone(), *due_at)))
                    .map(|due_at| DoseReminder {
                        medication_id: medication.id.clone(),
                        name: medication.name.clone(),
                        dosage: medication.dosage.clone(),
                        due_at,
                    })
                    .collect::<Vec<_>>()
            })
            .collect();
        reminders.sort_by(|a, b| a.due_at.cmp(&b.due_at).then_with(|| a.name.cmp(&b.name)));

        debug!("{} reminders due for patient {}", reminders.len(), patient_id);
        Ok(reminders)
    }

    #[instrument(skip(self, user, request), fields(user_id = %user.user_id))]
    pub async fn log_dose(&self, user: &UserInfo, medication_id: &str, request: LogDoseRequest) -> ServiceResult<DoseLog> {
        let medication = self.get(user, medication_id).await?;

        let day = request.scheduled_for.date_naive();
        let time = request.scheduled_for.time();
        let on_schedule = medication.is_scheduled_on(day)
            && medication
                .schedule_times()
                .iter()
                .any(|t| *t == time);
        if !on_schedule {
            return Err(ServiceError::Validation(format!(
                "no dose of {} is scheduled at {}",
                medication.name,
                request.scheduled_for.to_rfc3339()
            )));
        }

        let existing = self
            .doses
            .find_one(
                Query::new()
                    .where_eq("medication_id", medication_id)
                    .where_date("scheduled_for", FilterOp::Eq, request.scheduled_for),
            )
            .await?;
        if existing.is_some() {
            return Err(ServiceError::Conflict("dose already logged".to_string()));
        }

        let dose = self
            .doses
            .create(DoseLog {
                id: String::new(),
                medication_id: medication.id.clone(),
                patient_id: medication.patient_id.clone(),
                scheduled_for: request.scheduled_for,
                logged_at: Utc::now(),
                status: request.status,
            })
            .await?;

        self.audit
            .log(
                SecurityEvent::success(SecurityEventType::DoseLogged, &user.user_id)
                    .with_resource(resource(&medication.id)),
            )
            .await;
        Ok(dose)
    }

    /// Adherence over the inclusive day range
    pub async fn adherence(
        &self,
        user: &UserInfo,
        patient_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> ServiceResult<AdherenceReport> {
        if !user.can_access_patient(patient_id) {
            return Err(forbidden("view this adherence report"));
        }
        if to < from {
            return Err(ServiceError::Validation("`to` must not be before `from`".to_string()));
        }
        if (to - from).num_days() >= MAX_ADHERENCE_DAYS {
            return Err(ServiceError::Validation(format!(
                "range must not exceed {} days",
                MAX_ADHERENCE_DAYS
            )));
        }

        let start = start_of(from);
        let end = start_of(to) + Duration::days(1);

        let medications = self
            .medications
            .find(Query::new().where_eq("patient_id", patient_id))
            .await?;
        // Stopped medications still count for the days they were taken
        let scheduled: usize = medications
            .iter()
            .map(|m| {
                let mut active = m.clone();
                active.active = true;
                occurrences(&active, start, end - Duration::nanoseconds(1)).len()
            })
            .sum();

        let doses = self
            .doses
            .find(
                Query::new()
                    .where_eq("patient_id", patient_id)
                    .where_date("scheduled_for", FilterOp::Gte, start)
                    .where_date("scheduled_for", FilterOp::Lt, end),
            )
            .await?;
        let taken = doses.iter().filter(|d| d.status == DoseStatus::Taken).count();
        let skipped = doses.iter().filter(|d| d.status == DoseStatus::Skipped).count();

        Ok(AdherenceReport {
            patient_id: patient_id.to_string(),
            from,
            to,
            scheduled,
            taken,
            skipped,
            percentage: (scheduled > 0).then(|| (taken as f64 / scheduled as f64 * 100.0).min(100.0)),
        })
    }

    async fn logged_doses(
        &self,
        patient_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> ServiceResult<HashSet<(String, DateTime<Utc>)>> {
        let doses = self
            .doses
            .find(
                Query::new()
                    .where_eq("patient_id", patient_id)
                    .where_date("scheduled_for", FilterOp::Gte, from)
                    .where_date("scheduled_for", FilterOp::Lte, to),
            )
            .await?;
        Ok(doses.into_iter().map(|d| (d.medication_id, d.scheduled_for)).collect())
    }

    async fn log_change(&self, user: &UserInfo, id: &str, what: &str) {
        self.audit
            .log(
                SecurityEvent::success(SecurityEventType::MedicationUpdated, &user.user_id)
                    .with_resource(resource(id))
                    .with_details(what),
            )
            .await;
    }
}

/// Scheduled dose times of a medication within `[from, to]`
fn occurrences(medication: &Medication, from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<DateTime<Utc>> {
    let times = medication.schedule_times();
    let mut result = Vec::new();
    let mut day = from.date_naive();
    while day <= to.date_naive() {
        if medication.is_scheduled_on(day) {
            result.extend(
                times
                    .iter()
                    .map(|time| Utc.from_utc_datetime(&day.and_time(*time)))
                    .filter(|at| *at >= from && *at <= to),
            );
        }
        match day.succ_opt() {
            Some(next) => day = next,
            None => break,
        }
    }
    result
}

fn normalize_schedule(schedule: &[String]) -> ServiceResult<Vec<String>> {
    let mut times = schedule
        .iter()
        .map(|entry| {
            NaiveTime::parse_from_str(entry.trim(), "%H:%M")
                .map_err(|_| ServiceError::Validation(format!("invalid schedule time '{}', expected HH:MM", entry)))
        })
        .collect::<Result<Vec<_>, _>>()?;
    times.sort();
    times.dedup();
    Ok(times.iter().map(|t| t.format("%H:%M").to_string()).collect())
}

fn ensure_date_range(start: NaiveDate, end: Option<NaiveDate>) -> ServiceResult<()> {
    match end {
        Some(end) if end < start => Err(ServiceError::Validation("end_date must not be before start_date".to_string())),
        _ => Ok(()),
    }
}

fn start_of(day: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&day.and_time(NaiveTime::MIN))
}

fn resource(id: &str) -> String {
    format!("{}/{}", Medication::COLLECTION, id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::services::test_support::{user_info, TestStore};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn request(name: &str, schedule: &[&str]) -> AddMedicationRequest {
        AddMedicationRequest {
            patient_id: None,
            name: name.to_string(),
            dosage: "500 mg".to_string(),
            instructions: None,
            schedule: schedule.iter().map(|s| s.to_string()).collect(),
            start_date: date(2030, 1, 1),
            end_date: None,
            reminders_enabled: true,
        }
    }

    #[tokio::test]
    async fn test_add_normalizes_schedule() {
        let store = TestStore::new();
        let service = MedicationService::new(store.dyn_store(), store.audit());
        let patient = user_info("p1", Role::Patient);

        let med = service.add(&patient, request("Metformin", &["20:00", "08:00", " 08:00"])).await.unwrap();
        assert_eq!(med.schedule, vec!["08:00", "20:00"]);
        assert_eq!(med.patient_id, "p1");
        assert!(med.prescribed_by.is_none());

        assert!(matches!(
            service.add(&patient, request("Bad", &["8am"])).await,
            Err(ServiceError::Validation(_))
        ));
        let mut backwards = request("Backwards", &["08:00"]);
        backwards.end_date = Some(date(2029, 12, 31));
        assert!(matches!(service.add(&patient, backwards).await, Err(ServiceError::Validation(_))));

        let mut other = request("Other", &["08:00"]);
        other.patient_id = Some("p2".to_string());
        assert!(matches!(service.add(&patient, other).await, Err(ServiceError::Forbidden(_))));

        let mut prescribed = request("Lisinopril", &["09:00"]);
        prescribed.patient_id = Some("p1".to_string());
        let prescribed = service.add(&user_info("d1", Role::Doctor), prescribed).await.unwrap();
        assert_eq!(prescribed.prescribed_by.as_deref(), Some("d1"));

        let names: Vec<String> = service.list(&patient, "p1", true).await.unwrap().into_iter().map(|m| m.name).collect();
        assert_eq!(names, vec!["Lisinopril", "Metformin"]);
    }

    #[tokio::test]
    async fn test_reminders_skip_logged_and_inactive() {
        let store = TestStore::new();
        let service = MedicationService::new(store.dyn_store(), store.audit());
        let patient = user_info("p1", Role::Patient);

        let metformin = service.add(&patient, request("Metformin", &["08:00", "20:00"])).await.unwrap();
        let vitamin = service.add(&patient, request("Vitamin D", &["09:00"])).await.unwrap();
        let mut quiet = request("Quiet", &["08:30"]);
        quiet.reminders_enabled = false;
        service.add(&patient, quiet).await.unwrap();

        let now = at(2030, 3, 1, 7, 0);
        let due = service.reminders_due(&patient, "p1", now, Duration::hours(14)).await.unwrap();
        let names: Vec<&str> = due.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Metformin", "Vitamin D", "Metformin"]);

        service
            .log_dose(&patient, &metformin.id, LogDoseRequest { scheduled_for: at(2030, 3, 1, 8, 0), status: DoseStatus::Taken })
            .await
            .unwrap();
        service.deactivate(&patient, &vitamin.id).await.unwrap();

        let due = service.reminders_due(&patient, "p1", now, Duration::hours(14)).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].due_at, at(2030, 3, 1, 20, 0));
    }

    #[tokio::test]
    async fn test_log_dose_requires_schedule_and_is_unique() {
        let store = TestStore::new();
        let service = MedicationService::new(store.dyn_store(), store.audit());
        let patient = user_info("p1", Role::Patient);
        let med = service.add(&patient, request("Metformin", &["08:00"])).await.unwrap();

        let dose = LogDoseRequest { scheduled_for: at(2030, 3, 1, 8, 0), status: DoseStatus::Taken };
        service.log_dose(&patient, &med.id, dose.clone()).await.unwrap();
        assert!(matches!(service.log_dose(&patient, &med.id, dose).await, Err(ServiceError::Conflict(_))));

        let off_schedule = LogDoseRequest { scheduled_for: at(2030, 3, 1, 9, 0), status: DoseStatus::Taken };
        assert!(matches!(
            service.log_dose(&patient, &med.id, off_schedule).await,
            Err(ServiceError::Validation(_))
        ));
        let before_start = LogDoseRequest { scheduled_for: at(2029, 12, 31, 8, 0), status: DoseStatus::Taken };
        assert!(matches!(
            service.log_dose(&patient, &med.id, before_start).await,
            Err(ServiceError::Validation(_))
        ));

        assert!(matches!(
            service
                .log_dose(&user_info("p2", Role::Patient), &med.id, LogDoseRequest { scheduled_for: at(2030, 3, 2, 8, 0), status: DoseStatus::Skipped })
                .await,
            Err(ServiceError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_adherence_counts_scheduled_doses() {
        let store = TestStore::new();
        let service = MedicationService::new(store.dyn_store(), store.audit());
        let patient = user_info("p1", Role::Patient);
        let med = service.add(&patient, request("Metformin", &["08:00", "20:00"])).await.unwrap();

        for (day, hour, status) in [(1, 8, DoseStatus::Taken), (1, 20, DoseStatus::Taken), (2, 8, DoseStatus::Skipped)] {
            service
                .log_dose(&patient, &med.id, LogDoseRequest { scheduled_for: at(2030, 3, day, hour, 0), status })
                .await
                .unwrap();
        }

        let report = service.adherence(&patient, "p1", date(2030, 3, 1), date(2030, 3, 2)).await.unwrap();
        assert_eq!(report.scheduled, 4);
        assert_eq!(report.taken, 2);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.percentage, Some(50.0));

        let empty = service.adherence(&patient, "p1", date(2029, 1, 1), date(2029, 1, 2)).await.unwrap();
        assert_eq!(empty.percentage, None);

        assert!(matches!(
            service.adherence(&patient, "p1", date(2030, 3, 2), date(2030, 3, 1)).await,
            Err(ServiceError::Validation(_))
        ));
        assert!(matches!(
            service.adherence(&patient, "p1", date(2030, 1, 1), date(2031, 1, 2)).await,
            Err(ServiceError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_update_and_remove() {
        let store = TestStore::new();
        let service = MedicationService::new(store.dyn_store(), store.audit());
        let patient = user_info("p1", Role::Patient);
        let med = service.add(&patient, request("Metformin", &["08:00"])).await.unwrap();

        let updated = service
            .update(
                &patient,
                &med.id,
                UpdateMedicationRequest {
                    dosage: Some("850 mg".to_string()),
                    schedule: Some(vec!["21:00".to_string(), "07:30".to_string()]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.dosage, "850 mg");
        assert_eq!(updated.schedule, vec!["07:30", "21:00"]);
        assert_eq!(updated.name, "Metformin");

        service.remove(&patient, &med.id).await.unwrap();
        assert!(matches!(service.get(&patient, &med.id).await, Err(ServiceError::NotFound(_))));
    }
}
