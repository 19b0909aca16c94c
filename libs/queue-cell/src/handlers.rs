use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use directory_cell::{DoctorProfile, HospitalProfile, PatientProfile};
use shared_models::auth::{Role, User};
use shared_models::error::AppError;
use shared_utils::extractor::require_role;

use crate::{
    AdvanceOutcome, Appointment, BookAppointmentRequest, CallNextResponse, HistoryQuery, QueueError, QueueState,
    StatusFilter, UpdateScope, UpdateStatusRequest,
};

// ==============================================================================
// PROFILE RESOLUTION
// ==============================================================================

pub(crate) async fn doctor_for(state: &QueueState, user: &User) -> Result<DoctorProfile, AppError> {
    state
        .directory
        .doctor_by_user(&user.id)
        .await
        .map_err(QueueError::from)?
        .ok_or_else(|| AppError::NotFound("Doctor profile not found".to_string()))
}

pub(crate) async fn patient_for(state: &QueueState, user: &User) -> Result<PatientProfile, AppError> {
    state
        .directory
        .patient_by_user(&user.id)
        .await
        .map_err(QueueError::from)?
        .ok_or_else(|| AppError::ValidationError("Create patient profile first".to_string()))
}

pub(crate) async fn hospital_for(state: &QueueState, user: &User) -> Result<HospitalProfile, AppError> {
    state
        .directory
        .hospital_for_admin(&user.id)
        .await
        .map_err(QueueError::from)?
        .ok_or_else(|| AppError::NotFound("No hospital is administered by this user".to_string()))
}

// ==============================================================================
// PATIENT
// ==============================================================================

pub async fn book_appointment(
    State(state): State<Arc<QueueState>>,
    Extension(user): Extension<User>,
    Json(request): Json<BookAppointmentRequest>,
) -> Result<(StatusCode, Json<Appointment>), AppError> {
    require_role(&user, &[Role::Patient])?;
    let patient = patient_for(&state, &user).await?;

    let appointment = state.allocator.book(&patient, request, Utc::now()).await?;

    Ok((StatusCode::CREATED, Json(appointment)))
}

pub async fn my_appointments(
    State(state): State<Arc<QueueState>>,
    Extension(user): Extension<User>,
) -> Result<Json<Vec<Appointment>>, AppError> {
    require_role(&user, &[Role::Patient])?;
    let patient = patient_for(&state, &user).await?;

    Ok(Json(state.lifecycle.patient_appointments(patient.id).await?))
}

// ==============================================================================
// DOCTOR
// ==============================================================================

pub async fn doctor_queue(
    State(state): State<Arc<QueueState>>,
    Extension(user): Extension<User>,
) -> Result<Json<Vec<Appointment>>, AppError> {
    require_role(&user, &[Role::Doctor])?;
    let doctor = doctor_for(&state, &user).await?;

    Ok(Json(state.lifecycle.active_queue(doctor.id, state.today()).await?))
}

pub async fn doctor_history(
    State(state): State<Arc<QueueState>>,
    Extension(user): Extension<User>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<Appointment>>, AppError> {
    require_role(&user, &[Role::Doctor])?;
    let doctor = doctor_for(&state, &user).await?;

    let date = match query.date.as_deref().map(str::trim) {
        Some(raw) if !raw.is_empty() => state.policy.parse_date_param(raw)?,
        _ => return Err(QueueError::ValidationError("Date parameter is required".to_string()).into()),
    };
    let filter = StatusFilter::parse(query.status.as_deref())?;
    debug!("History for doctor {} on {} ({:?})", doctor.id, date, filter);

    Ok(Json(state.lifecycle.history(doctor.id, date, filter).await?))
}

pub async fn call_next(
    State(state): State<Arc<QueueState>>,
    Extension(user): Extension<User>,
) -> Result<Json<CallNextResponse>, AppError> {
    require_role(&user, &[Role::Doctor])?;
    let doctor = doctor_for(&state, &user).await?;

    let outcome = state
        .advancement
        .call_next(&doctor, state.today(), Utc::now())
        .await?;

    let response = match outcome {
        AdvanceOutcome::Called { appointment, .. } => CallNextResponse {
            queue_empty: false,
            appointment: Some(appointment),
        },
        AdvanceOutcome::QueueEmpty => CallNextResponse {
            queue_empty: true,
            appointment: None,
        },
    };
    Ok(Json(response))
}

pub async fn now_serving(
    State(state): State<Arc<QueueState>>,
    Extension(user): Extension<User>,
) -> Result<Json<Vec<Appointment>>, AppError> {
    require_role(&user, &[Role::Doctor])?;
    let doctor = doctor_for(&state, &user).await?;

    Ok(Json(state.lifecycle.now_serving(doctor.id, state.today()).await?))
}

// ==============================================================================
// HOSPITAL
// ==============================================================================

pub async fn hospital_board(
    State(state): State<Arc<QueueState>>,
    Extension(user): Extension<User>,
) -> Result<Json<Vec<Appointment>>, AppError> {
    require_role(&user, &[Role::HospitalAdmin])?;
    let hospital = hospital_for(&state, &user).await?;

    Ok(Json(state.lifecycle.live_board(hospital.id, state.today()).await?))
}

// ==============================================================================
// SHARED
// ==============================================================================

pub async fn get_appointment(
    State(state): State<Arc<QueueState>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Appointment>, AppError> {
    let appointment = state.lifecycle.get(appointment_id).await?;

    let allowed = match user.role() {
        Some(Role::Admin) => true,
        Some(Role::Patient) => patient_for(&state, &user).await?.id == appointment.patient_id,
        Some(Role::Doctor) => doctor_for(&state, &user).await?.id == appointment.doctor_id,
        Some(Role::HospitalAdmin) => hospital_for(&state, &user).await?.id == appointment.hospital_id,
        None => false,
    };

    if !allowed {
        return Err(AppError::Forbidden("Not a participant of this appointment".to_string()));
    }
    Ok(Json(appointment))
}

pub async fn update_status(
    State(state): State<Arc<QueueState>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<Appointment>, AppError> {
    let scope = match require_role(&user, &[Role::Doctor, Role::HospitalAdmin])? {
        Role::Doctor => UpdateScope::Doctor(doctor_for(&state, &user).await?.id),
        _ => UpdateScope::Hospital(hospital_for(&state, &user).await?.id),
    };

    let appointment = state
        .lifecycle
        .update_status(appointment_id, request.status, scope, Utc::now())
        .await?;

    Ok(Json(appointment))
}
