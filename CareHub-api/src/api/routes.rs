use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use tower_http::trace::TraceLayer;
use tracing::debug;

use care_hub_domain::auth::{auth_middleware, authorize, Role};

use crate::api::handlers::{
    admin, appointments, billing, blog, doctors, health, lab_results, media, medications, profile, umid,
};
use crate::api::security::configure_security;
use crate::api::state::AppState;
use crate::openapi::configure_swagger_routes;

/// Create the application router
pub fn create_app(state: AppState) -> Router {
    debug!("Creating application router");
    let auth = state.auth.clone();

    // Routes for any authenticated user; services enforce record-level access
    let api_routes = Router::new()
        .route("/me", get(profile::current_user))
        // Profiles
        .route("/profiles", post(profile::create_profile))
        .route(
            "/profiles/:id",
            get(profile::get_profile)
                .put(profile::update_profile)
                .delete(profile::deactivate_profile),
        )
        .route("/profiles/:id/accessibility", put(profile::update_accessibility))
        .route("/profiles/:id/security", put(profile::update_security))
        // Doctors
        .route("/doctors", get(doctors::list_doctors))
        .route("/doctors/:id", get(doctors::get_doctor))
        .route("/doctors/:id/schedule", get(doctors::doctor_schedule))
        .route("/doctors/:id/patients", get(doctors::doctor_patients))
        .route("/doctors/:id/appointments", get(appointments::doctor_appointments))
        // Appointments and telemedicine; static segments before parameters
        .route("/appointments", post(appointments::book_appointment))
        .route("/appointments/upcoming", get(appointments::upcoming_appointments))
        .route("/appointments/:id", get(appointments::get_appointment))
        .route("/appointments/:id/status", put(appointments::update_appointment_status))
        .route("/appointments/:id/reschedule", put(appointments::reschedule_appointment))
        .route("/appointments/:id/cancel", post(appointments::cancel_appointment))
        .route("/appointments/:id/join", post(appointments::join_video_room))
        // Lab results
        .route("/lab-results", post(lab_results::create_lab_result))
        .route("/lab-results/:id", get(lab_results::get_lab_result))
        .route("/lab-results/:id/status", put(lab_results::update_lab_status))
        .route("/lab-results/:id/notes", put(lab_results::add_lab_notes))
        // Billing
        .route("/bills", post(billing::create_bill))
        .route("/bills/:id", get(billing::get_bill))
        .route("/bills/:id/payments", post(billing::record_payment))
        .route("/claims", post(billing::submit_claim))
        .route("/claims/:id/status", put(billing::update_claim_status))
        // Medications
        .route("/medications", post(medications::add_medication))
        .route(
            "/medications/:id",
            get(medications::get_medication)
                .put(medications::update_medication)
                .delete(medications::remove_medication),
        )
        .route("/medications/:id/deactivate", post(medications::deactivate_medication))
        .route("/medications/:id/doses", post(medications::log_dose))
        // Medical IDs
        .route("/umids/:id/emergency-info", put(umid::update_emergency_info))
        .route("/umids/:id/revoke", post(umid::revoke_umid))
        // Media
        .route("/media/images", post(media::upload_image))
        // Per-patient views
        .route("/patients/:id/appointments", get(appointments::patient_appointments))
        .route("/patients/:id/appointments/stream", get(appointments::stream_appointments))
        .route("/patients/:id/lab-results", get(lab_results::patient_lab_results))
        .route("/patients/:id/lab-results/abnormal", get(lab_results::abnormal_lab_results))
        .route("/patients/:id/lab-results/trend", get(lab_results::lab_trend))
        .route("/patients/:id/lab-results/stream", get(lab_results::stream_lab_results))
        .route("/patients/:id/bills", get(billing::patient_bills))
        .route("/patients/:id/billing-summary", get(billing::billing_summary))
        .route("/patients/:id/claims", get(billing::patient_claims))
        .route("/patients/:id/medications", get(medications::patient_medications))
        .route("/patients/:id/reminders", get(medications::due_reminders))
        .route("/patients/:id/adherence", get(medications::adherence_report))
        .route("/patients/:id/umid", get(umid::get_umid).post(umid::generate_umid))
        .route("/patients/:id/umid/qr", get(umid::umid_qr))
        .layer(middleware::from_fn_with_state(auth.clone(), auth_middleware));

    debug!("API routes configured");

    // Blog authoring is limited to doctors and admins
    let authoring_routes = Router::new()
        .route("/blog/articles", post(blog::create_post))
        .route("/blog/articles/:id", put(blog::update_post).delete(blog::delete_post))
        .route("/blog/articles/:id/publish", post(blog::publish_post))
        .route("/blog/articles/:id/unpublish", post(blog::unpublish_post))
        .route("/blog/authors/:id/articles", get(blog::author_posts))
        .layer(middleware::from_fn_with_state(
            auth.clone(),
            authorize::require_any_role(vec![Role::Doctor, Role::Admin]),
        ))
        .layer(middleware::from_fn_with_state(
            auth.clone(),
            auth_middleware, // Authentication must happen before authorization
        ));

    let admin_routes = Router::new()
        .route("/admin/users", get(admin::list_users))
        .route("/admin/audit", get(admin::audit_events))
        .route("/admin/bills/overdue", post(admin::mark_overdue_bills))
        .layer(middleware::from_fn_with_state(auth.clone(), authorize::require_role(Role::Admin)))
        .layer(middleware::from_fn_with_state(auth, auth_middleware));

    debug!("Admin routes configured");

    // No token needed: first responders and blog readers
    let public_routes = Router::new()
        .route("/emergency/:code", get(umid::emergency_access))
        .route("/blog/posts", get(blog::list_published_posts))
        .route("/blog/posts/:slug", get(blog::get_post));

    let v1 = Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .merge(authoring_routes)
        .merge(admin_routes);

    let cors_origins = state.cors_origins.clone();
    let app = Router::new()
        .route("/health", get(health::health_check))
        .nest("/api/v1", v1)
        .with_state(state)
        .merge(configure_swagger_routes());

    debug!("Swagger UI merged");

    health::initialize_server_start_time();

    configure_security(app, &cors_origins).layer(TraceLayer::new_for_http())
}
