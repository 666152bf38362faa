//! REST + WebSocket API for the matching engine.
//!
//! Used by the binary and by integration tests. Create with [`create_router`] (auth
//! disabled, stdout audit) or [`create_router_with`]. State is passed with `Extension`
//! so the router is `Router<()>` and works with `into_make_service()`.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Extension, Path, Query, Request,
    },
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use log::{debug, warn};
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;

use crate::audit::{unix_now, AuditEvent, AuditSink, StdoutAuditSink};
use crate::auth::{require_admin, require_api_key_or_anonymous, require_role, AuthConfig, AuthUser, Role};
use crate::persistence::{FilePersistence, PersistedState};
use crate::{
    AllocationId, AppointmentId, CampaignId, CampaignRequest, CampaignStatus, CenterId, DonorId,
    Engine, EngineConfig, EngineError, Notification, PatientId, ScreeningTypeId, WaitlistId,
    WaitlistRequest,
};

/// Capacity of the live notification channel feeding WebSocket subscribers.
const NOTIFICATION_CHANNEL: usize = 1024;

/// Shared app state: one engine per process.
#[derive(Clone)]
pub struct AppState {
    pub(crate) engine: Arc<Mutex<Engine>>,
    audit: Arc<dyn AuditSink>,
    persistence: Option<FilePersistence>,
    /// Version handed to each background save; taken under the engine lock.
    save_version: Arc<AtomicU64>,
    notifications: broadcast::Sender<Notification>,
}

impl AppState {
    pub fn new(engine: Engine, audit: Arc<dyn AuditSink>, persistence: Option<FilePersistence>) -> Self {
        let (notifications, _) = broadcast::channel(NOTIFICATION_CHANNEL);
        Self {
            engine: Arc::new(Mutex::new(engine)),
            audit,
            persistence,
            save_version: Arc::new(AtomicU64::new(0)),
            notifications,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Engine>, Response> {
        self.engine.lock().map_err(|_| {
            (StatusCode::INTERNAL_SERVER_ERROR, "engine lock poisoned").into_response()
        })
    }

    /// Publish notifications written since `before` and persist the new state.
    ///
    /// Only the snapshot clone happens under the engine lock; serialization and file IO run
    /// on the blocking pool.
    fn after_mutation(&self, engine: &Engine, before: usize) {
        for n in engine.notifications_since(before) {
            // No subscribers is fine.
            let _ = self.notifications.send(n.clone());
        }
        if let Some(p) = &self.persistence {
            let version = self.save_version.fetch_add(1, Ordering::SeqCst) + 1;
            let state = PersistedState { engine: engine.snapshot() };
            let p = p.clone();
            tokio::task::spawn_blocking(move || match p.save_version(version, &state) {
                Ok(true) => {}
                Ok(false) => debug!("stale state save skipped version={}", version),
                Err(e) => warn!("state save failed path={} error={}", p.path().display(), e),
            });
        }
    }

    fn audit(&self, user: &AuthUser, action: &str, resource: serde_json::Value, ok: bool) {
        let outcome = if ok { "success" } else { "rejected" };
        self.audit
            .emit(&AuditEvent::now(user.actor(), action, Some(resource), outcome));
    }
}

/// Builds the router with auth disabled and stdout audit.
pub fn create_router(config: EngineConfig) -> Router<()> {
    let state = AppState::new(Engine::new(config), Arc::new(StdoutAuditSink), None);
    create_router_with(state, AuthConfig::disabled())
}

/// Builds the router from explicit state and auth config. `/health` is not authenticated.
pub fn create_router_with(state: AppState, auth: AuthConfig) -> Router<()> {
    let protected = Router::new()
        .route("/waitlist", post(enqueue))
        .route("/waitlist/withdraw", post(withdraw))
        .route("/waitlist/:screening_type_id", get(pending_waitlist))
        .route("/campaigns", post(create_campaign))
        .route("/campaigns/fund", post(fund_campaign))
        .route("/campaigns/status", post(set_campaign_status))
        .route("/pool/donate", post(donate_to_pool))
        .route("/matching/run", post(run_matching))
        .route("/allocations/claim", post(claim_allocation))
        .route("/allocations/expire", post(expire_allocations))
        .route("/appointments/check-in", post(check_in))
        .route("/appointments/complete", post(complete_screening))
        .route("/payouts", post(create_payout))
        .route("/patients/:patient_id/notifications", get(notifications))
        .route("/ws/notifications", get(ws_notifications))
        .layer(middleware::from_fn(move |req: Request, next: Next| {
            require_api_key_or_anonymous(req, next, auth.clone())
        }));
    Router::new()
        .route("/health", get(health))
        .merge(protected)
        .layer(Extension(state))
}

fn error_response(e: &EngineError) -> Response {
    let status = match e {
        EngineError::NotFound(..) | EngineError::UnknownCheckInCode(_) => StatusCode::NOT_FOUND,
        EngineError::Validation(_) => StatusCode::BAD_REQUEST,
        EngineError::Conflict(_) | EngineError::InsufficientFunds(_) => StatusCode::CONFLICT,
        EngineError::Expired(_) => StatusCode::GONE,
        EngineError::Forbidden(_) => StatusCode::FORBIDDEN,
    };
    (status, Json(serde_json::json!({ "error": e.to_string() }))).into_response()
}

fn ok<T: serde::Serialize>(value: T) -> Response {
    (StatusCode::OK, Json(value)).into_response()
}

type ApiResult = Result<Response, Response>;

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

// ---- waitlist ----

async fn enqueue(Extension(state): Extension<AppState>, Json(body): Json<WaitlistRequest>) -> ApiResult {
    let mut engine = state.lock()?;
    let before = engine.notification_count();
    let entry = engine.enqueue(body, unix_now()).map_err(|e| error_response(&e))?;
    state.after_mutation(&engine, before);
    Ok(ok(entry))
}

#[derive(serde::Deserialize)]
struct WithdrawRequest {
    waitlist_id: u64,
}

async fn withdraw(Extension(state): Extension<AppState>, Json(body): Json<WithdrawRequest>) -> ApiResult {
    let mut engine = state.lock()?;
    let before = engine.notification_count();
    let entry = engine
        .withdraw(WaitlistId(body.waitlist_id))
        .map_err(|e| error_response(&e))?;
    state.after_mutation(&engine, before);
    Ok(ok(entry))
}

async fn pending_waitlist(
    Extension(state): Extension<AppState>,
    Path(screening_type_id): Path<u64>,
) -> ApiResult {
    let engine = state.lock()?;
    Ok(ok(engine.pending_waitlist(ScreeningTypeId(screening_type_id))))
}

// ---- campaigns and pool ----

async fn create_campaign(
    Extension(state): Extension<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<CampaignRequest>,
) -> ApiResult {
    require_role(&user, &[Role::Donor])?;
    let mut engine = state.lock()?;
    let before = engine.notification_count();
    let donor_id = body.donor_id.0;
    let result = engine.create_campaign(body, unix_now());
    state.audit(
        &user,
        "campaign_create",
        serde_json::json!({
            "donor_id": donor_id,
            "campaign_id": result.as_ref().ok().map(|c| c.campaign_id.0),
        }),
        result.is_ok(),
    );
    let campaign = result.map_err(|e| error_response(&e))?;
    state.after_mutation(&engine, before);
    Ok(ok(campaign))
}

#[derive(serde::Deserialize)]
struct FundRequest {
    campaign_id: u64,
    amount: Decimal,
}

async fn fund_campaign(
    Extension(state): Extension<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<FundRequest>,
) -> ApiResult {
    require_role(&user, &[Role::Donor])?;
    let mut engine = state.lock()?;
    let before = engine.notification_count();
    let result = engine.fund_campaign(CampaignId(body.campaign_id), body.amount);
    state.audit(
        &user,
        "campaign_fund",
        serde_json::json!({ "campaign_id": body.campaign_id, "amount": body.amount.to_string() }),
        result.is_ok(),
    );
    let campaign = result.map_err(|e| error_response(&e))?;
    state.after_mutation(&engine, before);
    Ok(ok(campaign))
}

#[derive(serde::Deserialize)]
struct StatusRequest {
    campaign_id: u64,
    status: CampaignStatus,
}

async fn set_campaign_status(
    Extension(state): Extension<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<StatusRequest>,
) -> ApiResult {
    require_admin(&user)?;
    let mut engine = state.lock()?;
    let before = engine.notification_count();
    let result = engine.set_campaign_status(CampaignId(body.campaign_id), body.status);
    state.audit(
        &user,
        "campaign_status",
        serde_json::json!({ "campaign_id": body.campaign_id, "status": body.status }),
        result.is_ok(),
    );
    let campaign = result.map_err(|e| error_response(&e))?;
    state.after_mutation(&engine, before);
    Ok(ok(campaign))
}

#[derive(serde::Deserialize)]
struct DonateRequest {
    donor_id: u64,
    amount: Decimal,
}

async fn donate_to_pool(
    Extension(state): Extension<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<DonateRequest>,
) -> ApiResult {
    require_role(&user, &[Role::Donor])?;
    let mut engine = state.lock()?;
    let before = engine.notification_count();
    let result = engine.donate_to_pool(DonorId(body.donor_id), body.amount);
    state.audit(
        &user,
        "pool_donate",
        serde_json::json!({ "donor_id": body.donor_id, "amount": body.amount.to_string() }),
        result.is_ok(),
    );
    let balance = result.map_err(|e| error_response(&e))?;
    state.after_mutation(&engine, before);
    Ok(ok(serde_json::json!({ "general_pool": balance })))
}

// ---- matching and allocations ----

/// Admin sweeps may run as of an explicit time; default is the server clock.
#[derive(serde::Deserialize, Default)]
struct AsOfRequest {
    #[serde(default)]
    now: Option<u64>,
}

async fn run_matching(
    Extension(state): Extension<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<AsOfRequest>,
) -> ApiResult {
    require_admin(&user)?;
    let mut engine = state.lock()?;
    let before = engine.notification_count();
    let summary = engine.run_matching(body.now.unwrap_or_else(unix_now));
    state.audit(
        &user,
        "matching_run",
        serde_json::json!({
            "processed": summary.processed_count(),
            "matched": summary.matched_count(),
        }),
        true,
    );
    state.after_mutation(&engine, before);
    Ok(ok(summary))
}

async fn expire_allocations(
    Extension(state): Extension<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<AsOfRequest>,
) -> ApiResult {
    require_admin(&user)?;
    let mut engine = state.lock()?;
    let before = engine.notification_count();
    let expired = engine.expire_allocations(body.now.unwrap_or_else(unix_now));
    state.audit(
        &user,
        "allocation_expire",
        serde_json::json!({ "expired": expired.len() }),
        true,
    );
    state.after_mutation(&engine, before);
    Ok(ok(serde_json::json!({ "expired": expired })))
}

#[derive(serde::Deserialize)]
struct ClaimRequest {
    allocation_id: u64,
    patient_id: u64,
    center_id: u64,
    scheduled_at: u64,
}

async fn claim_allocation(Extension(state): Extension<AppState>, Json(body): Json<ClaimRequest>) -> ApiResult {
    let mut engine = state.lock()?;
    let before = engine.notification_count();
    let appointment = engine
        .claim_allocation(
            AllocationId(body.allocation_id),
            PatientId(body.patient_id),
            CenterId(body.center_id),
            body.scheduled_at,
            unix_now(),
        )
        .map_err(|e| error_response(&e))?;
    state.after_mutation(&engine, before);
    Ok(ok(appointment))
}

// ---- appointments and payouts ----

#[derive(serde::Deserialize)]
struct CheckInRequest {
    center_id: u64,
    check_in_code: String,
}

async fn check_in(
    Extension(state): Extension<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<CheckInRequest>,
) -> ApiResult {
    require_role(&user, &[Role::Center])?;
    let mut engine = state.lock()?;
    let before = engine.notification_count();
    let appointment = engine
        .check_in(CenterId(body.center_id), &body.check_in_code, unix_now())
        .map_err(|e| error_response(&e))?;
    state.after_mutation(&engine, before);
    Ok(ok(appointment))
}

#[derive(serde::Deserialize)]
struct CompleteRequest {
    appointment_id: u64,
    center_id: u64,
    #[serde(default)]
    result_summary: Option<String>,
}

async fn complete_screening(
    Extension(state): Extension<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<CompleteRequest>,
) -> ApiResult {
    require_role(&user, &[Role::Center])?;
    let mut engine = state.lock()?;
    let before = engine.notification_count();
    let appointment = engine
        .complete_screening(
            AppointmentId(body.appointment_id),
            CenterId(body.center_id),
            body.result_summary,
            unix_now(),
        )
        .map_err(|e| error_response(&e))?;
    state.after_mutation(&engine, before);
    Ok(ok(appointment))
}

#[derive(serde::Deserialize)]
struct PayoutRequest {
    center_id: u64,
}

async fn create_payout(
    Extension(state): Extension<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<PayoutRequest>,
) -> ApiResult {
    require_admin(&user)?;
    let mut engine = state.lock()?;
    let before = engine.notification_count();
    let result = engine.create_payout(CenterId(body.center_id), unix_now());
    state.audit(
        &user,
        "payout_create",
        serde_json::json!({
            "center_id": body.center_id,
            "amount": result.as_ref().ok().map(|p| p.amount.to_string()),
        }),
        result.is_ok(),
    );
    let payout = result.map_err(|e| error_response(&e))?;
    state.after_mutation(&engine, before);
    Ok(ok(payout))
}

// ---- notifications ----

async fn notifications(Extension(state): Extension<AppState>, Path(patient_id): Path<u64>) -> ApiResult {
    let engine = state.lock()?;
    Ok(ok(engine.notifications_for(PatientId(patient_id))))
}

#[derive(serde::Deserialize)]
struct FeedQuery {
    patient_id: u64,
}

async fn ws_notifications(
    ws: WebSocketUpgrade,
    Query(query): Query<FeedQuery>,
    Extension(state): Extension<AppState>,
) -> Response {
    let patient_id = PatientId(query.patient_id);
    ws.on_upgrade(move |socket| notification_feed(socket, state, patient_id))
}

/// Sends a snapshot of the patient's notifications, then pushes each new one.
async fn notification_feed(mut socket: WebSocket, state: AppState, patient_id: PatientId) {
    // Subscribe before the snapshot so nothing written in between is lost.
    let mut rx = state.notifications.subscribe();
    let snapshot = match state.engine.lock() {
        Ok(engine) => engine.notifications_for(patient_id),
        Err(_) => return,
    };
    let last_seen = snapshot.iter().map(|n| n.notification_id).max();
    let msg = serde_json::json!({
        "type": "snapshot",
        "patient_id": patient_id.0,
        "notifications": snapshot,
    });
    if socket.send(Message::Text(msg.to_string())).await.is_err() {
        return;
    }
    loop {
        tokio::select! {
            received = rx.recv() => match received {
                Ok(n) if n.patient_id == patient_id && Some(n.notification_id) > last_seen => {
                    let msg = serde_json::json!({ "type": "notification", "notification": n });
                    if socket.send(Message::Text(msg.to_string())).await.is_err() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("notification feed lagged patient_id={} skipped={}", patient_id.0, skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
    debug!("notification feed closed patient_id={}", patient_id.0);
}
