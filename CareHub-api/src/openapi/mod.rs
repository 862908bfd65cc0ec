use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use crate::api::handlers;

/// Configure Swagger UI endpoints
pub fn configure_swagger_routes() -> SwaggerUi {
    SwaggerUi::new("/api-docs").url("/api-docs/openapi.json", ApiDoc::openapi())
}

/// Registers the `bearer` scheme referenced by protected paths
struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

// API Documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        // Health
        handlers::health::health_check,

        // Profiles
        handlers::profile::current_user,
        handlers::profile::create_profile,
        handlers::profile::get_profile,
        handlers::profile::update_profile,
        handlers::profile::update_accessibility,
        handlers::profile::update_security,
        handlers::profile::deactivate_profile,

        // Doctors
        handlers::doctors::list_doctors,
        handlers::doctors::get_doctor,
        handlers::doctors::doctor_schedule,
        handlers::doctors::doctor_patients,

        // Appointments and telemedicine
        handlers::appointments::book_appointment,
        handlers::appointments::get_appointment,
        handlers::appointments::upcoming_appointments,
        handlers::appointments::update_appointment_status,
        handlers::appointments::reschedule_appointment,
        handlers::appointments::cancel_appointment,
        handlers::appointments::join_video_room,
        handlers::appointments::patient_appointments,
        handlers::appointments::doctor_appointments,
        handlers::appointments::stream_appointments,

        // Lab results
        handlers::lab_results::create_lab_result,
        handlers::lab_results::get_lab_result,
        handlers::lab_results::update_lab_status,
        handlers::lab_results::add_lab_notes,
        handlers::lab_results::patient_lab_results,
        handlers::lab_results::abnormal_lab_results,
        handlers::lab_results::lab_trend,
        handlers::lab_results::stream_lab_results,

        // Billing
        handlers::billing::create_bill,
        handlers::billing::get_bill,
        handlers::billing::record_payment,
        handlers::billing::patient_bills,
        handlers::billing::billing_summary,
        handlers::billing::submit_claim,
        handlers::billing::update_claim_status,
        handlers::billing::patient_claims,

        // Medications
        handlers::medications::add_medication,
        handlers::medications::get_medication,
        handlers::medications::update_medication,
        handlers::medications::deactivate_medication,
        handlers::medications::remove_medication,
        handlers::medications::log_dose,
        handlers::medications::patient_medications,
        handlers::medications::due_reminders,
        handlers::medications::adherence_report,

        // Blog
        handlers::blog::list_published_posts,
        handlers::blog::get_post,
        handlers::blog::create_post,
        handlers::blog::update_post,
        handlers::blog::publish_post,
        handlers::blog::unpublish_post,
        handlers::blog::delete_post,
        handlers::blog::author_posts,

        // Medical IDs
        handlers::umid::generate_umid,
        handlers::umid::get_umid,
        handlers::umid::umid_qr,
        handlers::umid::update_emergency_info,
        handlers::umid::revoke_umid,
        handlers::umid::emergency_access,

        // Media
        handlers::media::upload_image,

        // Admin
        handlers::admin::list_users,
        handlers::admin::audit_events,
        handlers::admin::mark_overdue_bills
    ),
    components(
        schemas(
            // API entities
            crate::api::error::ErrorResponse,
            crate::entities::common::PageParams,
            crate::entities::media::UploadImageRequest,
            crate::entities::media::UploadImageResponse,
            handlers::health::HealthResponse,
            handlers::health::ComponentStatus,
            handlers::health::ComponentHealthStatus,
            handlers::lab_results::UpdateLabStatusRequest,
            handlers::lab_results::LabNotesRequest,
            handlers::admin::OverdueResponse,

            // Auth
            care_hub_domain::auth::UserInfo,
            care_hub_domain::auth::Role,

            // Service requests and views
            care_hub_domain::services::appointments::BookAppointmentRequest,
            care_hub_domain::services::appointments::RescheduleRequest,
            care_hub_domain::services::appointments::UpdateStatusRequest,
            care_hub_domain::services::appointments::CancelRequest,
            care_hub_domain::services::lab_results::CreateLabResultRequest,
            care_hub_domain::services::lab_results::LabTrend,
            care_hub_domain::services::lab_results::TrendDirection,
            care_hub_domain::services::lab_results::TrendPoint,
            care_hub_domain::services::billing::CreateBillRequest,
            care_hub_domain::services::billing::PaymentRequest,
            care_hub_domain::services::billing::SubmitClaimRequest,
            care_hub_domain::services::billing::UpdateClaimRequest,
            care_hub_domain::services::billing::BillingSummary,
            care_hub_domain::services::doctors::BusySlot,
            care_hub_domain::services::medications::AddMedicationRequest,
            care_hub_domain::services::medications::UpdateMedicationRequest,
            care_hub_domain::services::medications::LogDoseRequest,
            care_hub_domain::services::medications::DoseReminder,
            care_hub_domain::services::medications::AdherenceReport,
            care_hub_domain::services::blog::CreatePostRequest,
            care_hub_domain::services::blog::UpdatePostRequest,
            care_hub_domain::services::profile::CreateProfileRequest,
            care_hub_domain::services::profile::UpdateProfileRequest,
            care_hub_domain::services::umid::EmergencyInfoRequest,
            care_hub_domain::services::umid::QrPayload,
            care_hub_domain::services::umid::EmergencyView,

            // Stored records
            care_hub_data::models::appointment::Appointment,
            care_hub_data::models::appointment::AppointmentKind,
            care_hub_data::models::appointment::AppointmentStatus,
            care_hub_data::models::appointment::VideoRoom,
            care_hub_data::models::lab_result::LabResult,
            care_hub_data::models::lab_result::LabStatus,
            care_hub_data::models::billing::Bill,
            care_hub_data::models::billing::BillStatus,
            care_hub_data::models::billing::LineItem,
            care_hub_data::models::billing::InsuranceClaim,
            care_hub_data::models::billing::ClaimStatus,
            care_hub_data::models::medication::Medication,
            care_hub_data::models::medication::DoseLog,
            care_hub_data::models::medication::DoseStatus,
            care_hub_data::models::blog::BlogPost,
            care_hub_data::models::umid::Umid,
            care_hub_data::models::umid::EmergencyInfo,
            care_hub_data::models::umid::EmergencyContact,
            care_hub_data::models::user::User,
            care_hub_data::models::user::AccessibilitySettings,
            care_hub_data::models::user::SecuritySettings,
            care_hub_data::models::security_event::SecurityEventRecord,

            // Pages
            care_hub_data::repository::AppointmentPage,
            care_hub_data::repository::LabResultPage,
            care_hub_data::repository::BillPage,
            care_hub_data::repository::BlogPostPage,
            care_hub_data::repository::UserPage
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "health", description = "Health check endpoint"),
        (name = "profile", description = "Account profiles and settings"),
        (name = "doctors", description = "Doctor directory and schedules"),
        (name = "appointments", description = "Appointment booking and tracking"),
        (name = "telemedicine", description = "Video visits"),
        (name = "lab_results", description = "Lab results, trends and live updates"),
        (name = "billing", description = "Bills, payments and insurance claims"),
        (name = "medications", description = "Medications, reminders and adherence"),
        (name = "blog", description = "Health articles"),
        (name = "umid", description = "Universal medical IDs and emergency access"),
        (name = "media", description = "Image uploads"),
        (name = "admin", description = "Administration")
    ),
    info(
        title = "CareHub API",
        version = "0.1.0",
        description = "Healthcare API for patients, doctors and administrators",
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        ),
    ),
    servers(
        (url = "/", description = "Local development server")
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_doc_generation() {
        let openapi = ApiDoc::openapi();

        assert_eq!(openapi.info.title, "CareHub API");
        assert_eq!(openapi.info.version, "0.1.0");

        let tags = openapi.tags.as_ref().expect("tags");
        assert!(tags.iter().any(|tag| tag.name == "appointments"));
        assert!(tags.iter().any(|tag| tag.name == "umid"));

        let paths = &openapi.paths.paths;
        assert!(paths.contains_key("/health"));
        assert!(paths.contains_key("/api/v1/appointments/{id}"));
        assert!(paths.contains_key("/api/v1/patients/{id}/lab-results/trend"));
        assert!(paths.contains_key("/api/v1/emergency/{code}"));
        assert!(paths.contains_key("/api/v1/admin/bills/overdue"));
    }

    #[test]
    fn test_bearer_scheme_is_registered() {
        let openapi = ApiDoc::openapi();
        let components = openapi.components.expect("components");
        assert!(components.security_schemes.contains_key("bearer"));
        assert!(components.schemas.contains_key("ErrorResponse"));
        assert!(components.schemas.contains_key("AppointmentPage"));
    }
}
