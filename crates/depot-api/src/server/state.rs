#[derive(Clone)]
struct AppState {
    inner: std::sync::Arc<Mutex<ServerInner>>,
    stream_tx: broadcast::Sender<StreamMessage>,
}

impl AppState {
    fn new() -> Self {
        let (stream_tx, _) = broadcast::channel(1024);
        Self {
            inner: std::sync::Arc::new(Mutex::new(ServerInner::default())),
            stream_tx,
        }
    }
}

#[derive(Debug, Default)]
struct ServerInner {
    engine: Option<EngineApi>,
    last_streamed_tick: Option<u64>,
}

fn require_run<'a>(inner: &'a ServerInner, run_id: &str) -> Result<&'a EngineApi, HttpApiError> {
    let Some(engine) = inner.engine.as_ref() else {
        return Err(HttpApiError::run_not_found(run_id, None));
    };

    if engine.run_id() != run_id {
        return Err(HttpApiError::run_not_found(run_id, Some(engine.run_id())));
    }

    Ok(engine)
}

fn require_run_mut<'a>(
    inner: &'a mut ServerInner,
    run_id: &str,
) -> Result<&'a mut EngineApi, HttpApiError> {
    let active_run_id = inner
        .engine
        .as_ref()
        .map(|engine| engine.run_id().to_string());
    let Some(engine) = inner.engine.as_mut() else {
        return Err(HttpApiError::run_not_found(run_id, None));
    };

    if engine.run_id() != run_id {
        return Err(HttpApiError::run_not_found(
            run_id,
            active_run_id.as_deref(),
        ));
    }

    Ok(engine)
}

/// Run status and (when the tick advanced) a fresh snapshot, for streaming
/// after a control action. Snapshots are taken between ticks only.
fn collect_delta_messages(inner: &mut ServerInner) -> Vec<StreamMessage> {
    let mut messages = Vec::new();

    let Some(engine) = inner.engine.as_ref() else {
        return messages;
    };

    let status = engine.status();
    messages.push(StreamMessage::run_status(status));

    if inner.last_streamed_tick != Some(status.current_tick) {
        let snapshot = engine.snapshot_for_current_tick();
        inner.last_streamed_tick = Some(snapshot.tick);
        messages.push(StreamMessage::snapshot_created(&snapshot));
    }

    messages
}

fn broadcast_messages(state: &AppState, messages: Vec<StreamMessage>) {
    for message in messages {
        let _ = state.stream_tx.send(message);
    }
}
