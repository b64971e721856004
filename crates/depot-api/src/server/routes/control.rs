#[derive(Debug, Deserialize)]
struct CreateRunRequest {
    scenario: Option<String>,
    config: Option<ScenarioConfig>,
    auto_start: Option<bool>,
}

#[derive(Debug, Serialize)]
struct CreateRunResponse {
    schema_version: String,
    run_id: String,
    status: RunStatus,
    replaced_existing_run: bool,
    started: bool,
}

async fn create_run(
    State(state): State<AppState>,
    Json(request): Json<CreateRunRequest>,
) -> Result<Json<CreateRunResponse>, HttpApiError> {
    let auto_start = request.auto_start.unwrap_or(false);
    let mut engine = match (request.scenario, request.config) {
        (Some(name), None) => EngineApi::from_scenario(&name).map_err(HttpApiError::from_engine)?,
        (None, Some(config)) => {
            EngineApi::from_config(config).map_err(HttpApiError::from_engine)?
        }
        _ => {
            return Err(HttpApiError::invalid_query(
                "provide exactly one of `scenario` or `config`",
                None,
            ))
        }
    };

    if auto_start {
        engine.start();
    }

    let (response, messages) = {
        let mut inner = state.inner.lock().await;
        let replaced_existing_run = inner.engine.is_some();
        let status = engine.status().clone();
        inner.engine = Some(engine);
        inner.last_streamed_tick = None;

        let mut messages = Vec::new();
        if replaced_existing_run {
            messages.push(StreamMessage::warning(
                &status.run_id,
                status.current_tick,
                "existing run state was replaced by POST /runs".to_string(),
            ));
        }
        messages.extend(collect_delta_messages(&mut inner));

        (
            CreateRunResponse {
                schema_version: SCHEMA_VERSION_V1.to_string(),
                run_id: status.run_id.clone(),
                status,
                replaced_existing_run,
                started: auto_start,
            },
            messages,
        )
    };

    broadcast_messages(&state, messages);

    Ok(Json(response))
}

#[derive(Debug, Serialize)]
struct RunControlResponse {
    schema_version: String,
    run_id: String,
    status: RunStatus,
    committed: Option<u64>,
}

async fn start_run(
    Path(run_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<RunControlResponse>, HttpApiError> {
    control_response(&state, &run_id, |engine| {
        engine.start();
        Ok(None)
    })
    .await
}

async fn pause_run(
    Path(run_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<RunControlResponse>, HttpApiError> {
    control_response(&state, &run_id, |engine| {
        engine.pause();
        Ok(None)
    })
    .await
}

#[derive(Debug, Deserialize, Default)]
struct StepRequest {
    steps: Option<u64>,
}

async fn step_run(
    Path(run_id): Path<String>,
    State(state): State<AppState>,
    request: Option<Json<StepRequest>>,
) -> Result<Json<RunControlResponse>, HttpApiError> {
    let steps = request.and_then(|Json(r)| r.steps).unwrap_or(1);
    if steps == 0 {
        return Err(HttpApiError::invalid_query(
            "steps must be >= 1",
            Some("steps=0".to_string()),
        ));
    }

    control_response(&state, &run_id, move |engine| {
        let (_, committed) = engine.step(steps);
        Ok(Some(committed))
    })
    .await
}

#[derive(Debug, Deserialize)]
struct RunToTickRequest {
    target_tick: u64,
}

async fn run_to_tick(
    Path(run_id): Path<String>,
    State(state): State<AppState>,
    Json(request): Json<RunToTickRequest>,
) -> Result<Json<RunControlResponse>, HttpApiError> {
    control_response(&state, &run_id, move |engine| {
        let (_, committed) = engine.run_to_tick(request.target_tick);
        Ok(Some(committed))
    })
    .await
}

async fn reset_run(
    Path(run_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<RunControlResponse>, HttpApiError> {
    control_response(&state, &run_id, |engine| {
        engine.reset().map_err(HttpApiError::from_engine)?;
        Ok(None)
    })
    .await
}

/// Shared shape of every mutating run endpoint: resolve the run, apply the
/// action, stream the deltas, return the fresh status.
async fn control_response<F>(
    state: &AppState,
    run_id: &str,
    action: F,
) -> Result<Json<RunControlResponse>, HttpApiError>
where
    F: FnOnce(&mut EngineApi) -> Result<Option<u64>, HttpApiError>,
{
    let (response, messages) = {
        let mut inner = state.inner.lock().await;
        let (status, committed) = {
            let engine = require_run_mut(&mut inner, run_id)?;
            let committed = action(engine)?;
            (engine.status().clone(), committed)
        };

        let messages = collect_delta_messages(&mut inner);

        (
            RunControlResponse {
                schema_version: SCHEMA_VERSION_V1.to_string(),
                run_id: status.run_id.clone(),
                status,
                committed,
            },
            messages,
        )
    };

    broadcast_messages(state, messages);

    Ok(Json(response))
}
