use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    Extension, Json,
};
use futures::{Stream, StreamExt};
use tracing::{info, instrument};

use care_hub_data::models::appointment::{Appointment, VideoRoom};
use care_hub_data::repository::AppointmentPage;
use care_hub_domain::auth::UserInfo;
use care_hub_domain::services::appointments::{
    AppointmentFilter, BookAppointmentRequest, CancelRequest, RescheduleRequest, UpdateStatusRequest,
};

use crate::api::error::{ApiResult, ErrorResponse};
use crate::api::extract::{change_event, ApiJson};
use crate::api::state::AppState;
use crate::entities::common::{LimitParams, PageParams};

/// Book an appointment
#[utoipa::path(
    post,
    path = "/api/v1/appointments",
    request_body = BookAppointmentRequest,
    responses(
        (status = 201, description = "Appointment booked", body = Appointment),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 409, description = "Doctor already booked at that time", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "appointments"
)]
#[instrument(skip_all, fields(user_id = %user.user_id))]
pub async fn book_appointment(
    State(state): State<AppState>,
    Extension(user): Extension<UserInfo>,
    ApiJson(request): ApiJson<BookAppointmentRequest>,
) -> ApiResult<impl IntoResponse> {
    let appointment = state.services.appointments.book(&user, request).await?;
    info!("Booked appointment {}", appointment.id);
    Ok((StatusCode::CREATED, Json(appointment)))
}

#[utoipa::path(
    get,
    path = "/api/v1/appointments/{id}",
    params(("id" = String, Path, description = "Appointment ID")),
    responses(
        (status = 200, description = "Appointment found", body = Appointment),
        (status = 403, description = "Not a participant", body = ErrorResponse),
        (status = 404, description = "Appointment not found", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "appointments"
)]
#[instrument(skip_all, fields(user_id = %user.user_id, id = %id))]
pub async fn get_appointment(
    State(state): State<AppState>,
    Extension(user): Extension<UserInfo>,
    Path(id): Path<String>,
) -> ApiResult<Json<Appointment>> {
    Ok(Json(state.services.appointments.get(&user, &id).await?))
}

/// Next scheduled or confirmed appointments of the caller
#[utoipa::path(
    get,
    path = "/api/v1/appointments/upcoming",
    params(LimitParams),
    responses((status = 200, description = "Upcoming appointments", body = [Appointment])),
    security(("bearer" = [])),
    tag = "appointments"
)]
#[instrument(skip_all, fields(user_id = %user.user_id))]
pub async fn upcoming_appointments(
    State(state): State<AppState>,
    Extension(user): Extension<UserInfo>,
    Query(params): Query<LimitParams>,
) -> ApiResult<Json<Vec<Appointment>>> {
    let limit = params.resolve(5, 50);
    Ok(Json(state.services.appointments.upcoming(&user, limit).await?))
}

#[utoipa::path(
    put,
    path = "/api/v1/appointments/{id}/status",
    params(("id" = String, Path, description = "Appointment ID")),
    request_body = UpdateStatusRequest,
    responses(
        (status = 200, description = "Status changed", body = Appointment),
        (status = 409, description = "Transition not allowed", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "appointments"
)]
#[instrument(skip_all, fields(user_id = %user.user_id, id = %id))]
pub async fn update_appointment_status(
    State(state): State<AppState>,
    Extension(user): Extension<UserInfo>,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<UpdateStatusRequest>,
) -> ApiResult<Json<Appointment>> {
    Ok(Json(state.services.appointments.update_status(&user, &id, request).await?))
}

#[utoipa::path(
    put,
    path = "/api/v1/appointments/{id}/reschedule",
    params(("id" = String, Path, description = "Appointment ID")),
    request_body = RescheduleRequest,
    responses(
        (status = 200, description = "Appointment moved", body = Appointment),
        (status = 409, description = "Slot taken or appointment closed", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "appointments"
)]
#[instrument(skip_all, fields(user_id = %user.user_id, id = %id))]
pub async fn reschedule_appointment(
    State(state): State<AppState>,
    Extension(user): Extension<UserInfo>,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<RescheduleRequest>,
) -> ApiResult<Json<Appointment>> {
    Ok(Json(state.services.appointments.reschedule(&user, &id, request).await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/appointments/{id}/cancel",
    params(("id" = String, Path, description = "Appointment ID")),
    request_body = CancelRequest,
    responses(
        (status = 200, description = "Appointment cancelled", body = Appointment),
        (status = 409, description = "Appointment already closed", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "appointments"
)]
#[instrument(skip_all, fields(user_id = %user.user_id, id = %id))]
pub async fn cancel_appointment(
    State(state): State<AppState>,
    Extension(user): Extension<UserInfo>,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<CancelRequest>,
) -> ApiResult<Json<Appointment>> {
    let appointment = state.services.appointments.cancel(&user, &id, request).await?;
    info!("Cancelled appointment {}", id);
    Ok(Json(appointment))
}

/// Video room for a telemedicine appointment
#[utoipa::path(
    post,
    path = "/api/v1/appointments/{id}/join",
    params(("id" = String, Path, description = "Appointment ID")),
    responses(
        (status = 200, description = "Room to join", body = VideoRoom),
        (status = 403, description = "Not a participant", body = ErrorResponse),
        (status = 409, description = "Not a joinable video appointment", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "telemedicine"
)]
#[instrument(skip_all, fields(user_id = %user.user_id, id = %id))]
pub async fn join_video_room(
    State(state): State<AppState>,
    Extension(user): Extension<UserInfo>,
    Path(id): Path<String>,
) -> ApiResult<Json<VideoRoom>> {
    Ok(Json(state.services.telemedicine.join(&user, &id).await?))
}

/// A patient's appointments in time order
#[utoipa::path(
    get,
    path = "/api/v1/patients/{id}/appointments",
    params(("id" = String, Path, description = "Patient ID"), AppointmentFilter, PageParams),
    responses(
        (status = 200, description = "One page of appointments", body = AppointmentPage),
        (status = 403, description = "Not allowed", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "appointments"
)]
#[instrument(skip_all, fields(user_id = %user.user_id, patient_id = %id))]
pub async fn patient_appointments(
    State(state): State<AppState>,
    Extension(user): Extension<UserInfo>,
    Path(id): Path<String>,
    Query(filter): Query<AppointmentFilter>,
    Query(page): Query<PageParams>,
) -> ApiResult<Json<AppointmentPage>> {
    let page = state
        .services
        .appointments
        .list_for_patient(&user, &id, &filter, &page.into())
        .await?;
    Ok(Json(page))
}

/// A doctor's appointments in time order
#[utoipa::path(
    get,
    path = "/api/v1/doctors/{id}/appointments",
    params(("id" = String, Path, description = "Doctor ID"), AppointmentFilter, PageParams),
    responses(
        (status = 200, description = "One page of appointments", body = AppointmentPage),
        (status = 403, description = "Not allowed", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "appointments"
)]
#[instrument(skip_all, fields(user_id = %user.user_id, doctor_id = %id))]
pub async fn doctor_appointments(
    State(state): State<AppState>,
    Extension(user): Extension<UserInfo>,
    Path(id): Path<String>,
    Query(filter): Query<AppointmentFilter>,
    Query(page): Query<PageParams>,
) -> ApiResult<Json<AppointmentPage>> {
    let page = state
        .services
        .appointments
        .list_for_doctor(&user, &id, &filter, &page.into())
        .await?;
    Ok(Json(page))
}

/// Live changes to a patient's appointments as server-sent events
#[utoipa::path(
    get,
    path = "/api/v1/patients/{id}/appointments/stream",
    params(("id" = String, Path, description = "Patient ID")),
    responses(
        (status = 200, description = "Events named added, modified or removed", body = String, content_type = "text/event-stream"),
        (status = 403, description = "Not allowed", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "appointments"
)]
#[instrument(skip_all, fields(user_id = %user.user_id, patient_id = %id))]
pub async fn stream_appointments(
    State(state): State<AppState>,
    Extension(user): Extension<UserInfo>,
    Path(id): Path<String>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, axum::Error>>>> {
    let subscription = state.services.appointments.watch_for_patient(&user, &id)?;
    info!("Streaming appointment changes for {}", id);
    Ok(Sse::new(subscription.into_stream().map(change_event)).keep_alive(KeepAlive::default()))
}
