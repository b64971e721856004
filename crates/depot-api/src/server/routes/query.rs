#[derive(Debug, Serialize)]
struct ListRunsResponse {
    schema_version: String,
    active_run_id: Option<String>,
    status: Option<RunStatus>,
}

async fn list_runs(State(state): State<AppState>) -> Json<ListRunsResponse> {
    let inner = state.inner.lock().await;
    let (active_run_id, status) = inner
        .engine
        .as_ref()
        .map(|engine| {
            (
                Some(engine.run_id().to_string()),
                Some(engine.status().clone()),
            )
        })
        .unwrap_or((None, None));

    Json(ListRunsResponse {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        active_run_id,
        status,
    })
}

async fn get_status(
    Path(run_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<RunStatus>, HttpApiError> {
    let inner = state.inner.lock().await;
    let status = require_run(&inner, &run_id)?.status().clone();
    Ok(Json(status))
}

async fn get_snapshot(
    Path(run_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Snapshot>, HttpApiError> {
    let inner = state.inner.lock().await;
    let snapshot = require_run(&inner, &run_id)?.snapshot_for_current_tick();
    Ok(Json(snapshot))
}

#[derive(Debug, Serialize)]
struct ScenarioListEntry {
    name: String,
    description: String,
}

#[derive(Debug, Serialize)]
struct ListScenariosResponse {
    schema_version: String,
    scenarios: Vec<ScenarioListEntry>,
}

async fn list_scenarios() -> Json<ListScenariosResponse> {
    let scenarios = depot_core::scenario::catalog()
        .into_iter()
        .map(|(name, description)| ScenarioListEntry { name, description })
        .collect();

    Json(ListScenariosResponse {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        scenarios,
    })
}
