use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use castkeeper_core::config::ServerSettings;
use castkeeper_core::entities::{Credential, CredentialUpdate, Intent, ServiceName};
use castkeeper_core::orchestrator::IntentSender;
use castkeeper_core::ports::{CredentialStore, OauthClient};
use castkeeper_core::status::StatusRegistry;
use castkeeper_core::{Error, Runtime};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, error, info, warn};

#[derive(Clone)]
struct AppState {
    registry: Arc<StatusRegistry>,
    intents: IntentSender,
    store: Arc<dyn CredentialStore>,
    oauth: Arc<dyn OauthClient>,
    admin_password: Option<String>,
}

/// HTTP surface for status checks, service control and token intake.
pub struct ControlServer {
    state: AppState,
    bind: String,
    running: Arc<AtomicBool>,
    shutdown_tx: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}

impl ControlServer {
    pub fn new(runtime: &Runtime, oauth: Arc<dyn OauthClient>, settings: &ServerSettings) -> Self {
        Self {
            state: AppState {
                registry: runtime.registry(),
                intents: runtime.intents(),
                store: runtime.store(),
                oauth,
                admin_password: settings.admin_password.clone(),
            },
            bind: format!("{}:{}", settings.host, settings.port),
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx: Arc::new(Mutex::new(None)),
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/status", get(status))
            .route("/services/init", post(init_services))
            .route("/services/:service/:action", post(control_service))
            .route("/auth/login", get(login))
            .route("/auth/callback", get(callback))
            .route("/auth/token", post(set_token))
            .with_state(self.state.clone())
    }

    /// Bind and serve in the background. Returns the bound address.
    pub async fn start(&self) -> Result<SocketAddr, Error> {
        if self.running.load(Ordering::SeqCst) {
            return Err(Error::Other("control server already running".to_string()));
        }

        let listener = tokio::net::TcpListener::bind(&self.bind).await?;
        let addr = listener.local_addr()?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        *self.shutdown_tx.lock().await = Some(shutdown_tx);

        let app = self.router();
        let running = self.running.clone();
        running.store(true, Ordering::SeqCst);
        info!(%addr, "control server listening");

        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                    debug!("control server shutting down");
                })
                .await
            {
                error!(error = %e, "control server stopped unexpectedly");
            }
            running.store(false, Ordering::SeqCst);
        });

        Ok(addr)
    }

    pub async fn stop(&self) -> Result<(), Error> {
        if let Some(tx) = self.shutdown_tx.lock().await.take() {
            let _ = tx.send(());
        }
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

fn message(status: StatusCode, text: impl Into<String>) -> Response {
    (status, Json(json!({ "message": text.into() }))).into_response()
}

async fn status(State(state): State<AppState>) -> Response {
    let snapshot = state.registry.get();
    let code = if snapshot.all_running() {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (code, Json(snapshot)).into_response()
}

#[derive(Debug, Deserialize)]
struct PasswordQuery {
    password: Option<String>,
}

/// Checks the admin password; `Err` carries the response to send instead.
fn authorize(state: &AppState, query: &PasswordQuery) -> Result<(), Response> {
    let Some(expected) = &state.admin_password else {
        return Err(message(StatusCode::NOT_FOUND, "This endpoint is disabled"));
    };
    match &query.password {
        None => Err(message(
            StatusCode::FORBIDDEN,
            "Provide a 'password' query parameter",
        )),
        Some(given) if given != expected => {
            warn!("rejected control request with an invalid password");
            Err(message(StatusCode::FORBIDDEN, "Provided password is invalid"))
        }
        Some(_) => Ok(()),
    }
}

fn emit(state: &AppState, intent: Intent) -> Result<(), Response> {
    state.intents.emit(intent).map_err(|e| {
        error!(intent = %intent, error = %e, "couldn't emit intent");
        message(StatusCode::SERVICE_UNAVAILABLE, e.to_string())
    })
}

async fn control_service(
    State(state): State<AppState>,
    Path((service, action)): Path<(String, String)>,
    Query(query): Query<PasswordQuery>,
) -> Response {
    if let Err(response) = authorize(&state, &query) {
        return response;
    }

    let service: ServiceName = match service.parse() {
        Ok(service) => service,
        Err(e) => return message(StatusCode::BAD_REQUEST, e),
    };
    let intent = match action.as_str() {
        "start" => Intent::Start(service),
        "stop" => Intent::Stop(service),
        other => return message(StatusCode::BAD_REQUEST, format!("unknown action '{}'", other)),
    };

    if let Err(response) = emit(&state, intent) {
        return response;
    }
    info!(intent = %intent, "intent accepted");
    (StatusCode::ACCEPTED, Json(json!({ "intent": intent.to_string() }))).into_response()
}

/// Start every service that isn't running yet.
async fn init_services(
    State(state): State<AppState>,
    Query(query): Query<PasswordQuery>,
) -> Response {
    if let Err(response) = authorize(&state, &query) {
        return response;
    }

    let snapshot = state.registry.get();
    let mut started = Vec::new();
    for service in ServiceName::ALL {
        if snapshot.get(service).is_running() {
            continue;
        }
        if let Err(response) = emit(&state, Intent::Start(service)) {
            return response;
        }
        started.push(service);
    }

    if started.is_empty() {
        return message(StatusCode::OK, "All services are already running");
    }
    (StatusCode::ACCEPTED, Json(json!({ "starting": started }))).into_response()
}

async fn login(State(state): State<AppState>) -> Response {
    match state.oauth.authorize_url() {
        Ok(url) => Redirect::temporary(&url).into_response(),
        Err(e) => {
            error!(error = %e, "couldn't build the authorize url");
            message(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    code: Option<String>,
    scope: Option<String>,
}

async fn callback(State(state): State<AppState>, Query(query): Query<CallbackQuery>) -> Response {
    let Some(code) = query.code else {
        return message(StatusCode::BAD_REQUEST, "code is not provided");
    };
    let Some(scope) = query.scope else {
        return message(StatusCode::BAD_REQUEST, "scope is not provided");
    };

    let token = match state.oauth.exchange_code(&code).await {
        Ok(token) => token,
        Err(e) => {
            error!(error = %e, "couldn't retrieve an access token");
            return message(StatusCode::BAD_GATEWAY, "Couldn't retrieve an access token");
        }
    };

    match state.store.set_credential(Credential::Structured(token), true).await {
        CredentialUpdate::Rejected => {
            message(StatusCode::BAD_GATEWAY, "Received an unusable access token")
        }
        _ => (StatusCode::OK, Json(json!({ "code": code, "scope": scope }))).into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct TokenBody {
    token: Credential,
}

async fn set_token(
    State(state): State<AppState>,
    body: Result<Json<TokenBody>, JsonRejection>,
) -> Response {
    let Ok(Json(TokenBody { token })) = body else {
        return message(StatusCode::FORBIDDEN, "Invalid access token provided");
    };
    if !token.is_well_formed() {
        return message(StatusCode::FORBIDDEN, "Invalid access token provided");
    }

    match state.store.set_credential(token, true).await {
        CredentialUpdate::Rejected => message(StatusCode::FORBIDDEN, "Access token is expired"),
        CredentialUpdate::PersistFailed => {
            message(StatusCode::OK, "Access token updated in memory only")
        }
        CredentialUpdate::Persisted | CredentialUpdate::InMemory => {
            message(StatusCode::OK, "Access token updated")
        }
    }
}
