#[derive(Debug)]
pub enum ServerError {
    Io(std::io::Error),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "server io error: {err}"),
        }
    }
}

impl std::error::Error for ServerError {}

impl From<std::io::Error> for ServerError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

#[derive(Debug)]
struct HttpApiError {
    status: StatusCode,
    error: ApiError,
}

impl HttpApiError {
    fn run_not_found(requested_run_id: &str, active_run_id: Option<&str>) -> Self {
        let details = active_run_id
            .map(|active| format!("requested_run_id={requested_run_id} active_run_id={active}"));
        Self {
            status: StatusCode::NOT_FOUND,
            error: ApiError::new(
                ErrorCode::RunNotFound,
                "run_id does not match an active run",
                details,
            ),
        }
    }

    fn invalid_query(message: impl Into<String>, details: Option<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error: ApiError::new(ErrorCode::InvalidQuery, message, details),
        }
    }

    fn from_engine(err: EngineError) -> Self {
        match err {
            EngineError::ScenarioUnknown(name) => Self {
                status: StatusCode::NOT_FOUND,
                error: ApiError::new(
                    ErrorCode::ScenarioUnknown,
                    "no scenario with that name",
                    Some(format!("scenario={name}")),
                ),
            },
            EngineError::Config(config_err) => Self {
                status: StatusCode::BAD_REQUEST,
                error: ApiError::new(
                    ErrorCode::InvalidConfig,
                    "scenario configuration is invalid",
                    Some(config_err.to_string()),
                ),
            },
        }
    }
}

impl IntoResponse for HttpApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.error)).into_response()
    }
}
