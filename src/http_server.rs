use crate::gen1::{self, Gen1Emeter, Gen1Status, StatusClock};
use crate::gen2::{self, EmDataStatus, EmStatus};
use crate::identity::DeviceIdentity;
use crate::meter_source::SnapshotReader;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use chrono::Local;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Shared by every handler. Handlers only ever read the snapshot.
#[derive(Clone)]
pub struct AppState {
    pub snapshot: SnapshotReader,
    pub identity: Arc<DeviceIdentity>,
    pub started_at: Instant,
    pub single_phase_emulation: bool,
}

impl AppState {
    pub fn new(
        snapshot: SnapshotReader,
        identity: Arc<DeviceIdentity>,
        single_phase_emulation: bool,
    ) -> Self {
        Self {
            snapshot,
            identity,
            started_at: Instant::now(),
            single_phase_emulation,
        }
    }

    fn clock(&self) -> StatusClock {
        StatusClock {
            now: Local::now(),
            uptime: self.started_at.elapsed(),
        }
    }
}

pub fn create_router(state: AppState, enable_gen1: bool, enable_gen2: bool) -> Router {
    let mut router: Router<AppState> = Router::new();

    if enable_gen1 {
        router = router
            .route("/status", get(gen1_status))
            .route("/shelly", get(gen1_device_info))
            .route("/settings", get(gen1_settings))
            .route("/emeter/:index", get(gen1_emeter));
    }

    if enable_gen2 {
        // Gen2 clients use either verb for RPC calls
        router = router
            .route("/rpc/EM.GetStatus", get(em_get_status).post(em_get_status))
            .route("/rpc/Shelly.GetStatus", get(em_get_status).post(em_get_status))
            .route(
                "/rpc/EMData.GetStatus",
                get(em_data_get_status).post(em_data_get_status),
            )
            .route(
                "/rpc/Shelly.GetDeviceInfo",
                get(gen2_device_info).post(gen2_device_info),
            );
    }

    router
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn gen1_status(State(state): State<AppState>) -> Json<Gen1Status> {
    let snapshot = state.snapshot.current();
    Json(gen1::status(
        &snapshot,
        &state.identity,
        state.clock(),
        state.single_phase_emulation,
    ))
}

async fn gen1_device_info(State(state): State<AppState>) -> Json<Value> {
    Json(gen1::device_info(&state.identity))
}

async fn gen1_settings(State(state): State<AppState>) -> Json<Value> {
    Json(gen1::settings(&state.identity))
}

async fn gen1_emeter(
    State(state): State<AppState>,
    Path(index): Path<usize>,
) -> Result<Json<Gen1Emeter>, StatusCode> {
    let snapshot = state.snapshot.current();
    gen1::emeter(&snapshot, index, state.single_phase_emulation)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn em_get_status(State(state): State<AppState>) -> Json<EmStatus> {
    let snapshot = state.snapshot.current();
    Json(gen2::em_status(&snapshot, state.single_phase_emulation))
}

async fn em_data_get_status(State(state): State<AppState>) -> Json<EmDataStatus> {
    let snapshot = state.snapshot.current();
    Json(gen2::em_data_status(&snapshot, state.single_phase_emulation))
}

async fn gen2_device_info(State(state): State<AppState>) -> Json<Value> {
    Json(gen2::device_info(&state.identity))
}
