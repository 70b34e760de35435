use crate::autosave::AutoSave;
use crate::configuration::Context;
use crate::database::services::drafts::DraftStore;
use crate::database::types::{ClientKind, EstimateDraft, NewClient, OwnerContext};
use crate::database::DatabaseService;
use crate::deepsearch::DeepSearchService;
use crate::directory::ClientDirectory;
use crate::email::{EmailAttachment, EmailRequest, EmailService};
use crate::estimate::{Estimate, EstimateSession, EstimateUpdate};
use crate::normalizer;
use crate::pdf::{create_estimate_pdf, PdfTemplate};
use axum::{
    body::Body,
    extract::{Path, State},
    http::{
        header::{CONTENT_DISPOSITION, CONTENT_TYPE},
        HeaderMap, StatusCode,
    },
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::{Datelike, Local};
use moka::sync::Cache;
use rand::prelude::*;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tracing::{error, info};
use uuid::Uuid;

type ApiError = (StatusCode, Json<Value>);
type ApiResult = Result<Response, ApiError>;

type SessionCache = Cache<Uuid, Arc<Mutex<EstimateSession>>>;

#[derive(Clone)]
pub struct AppState {
    pub context: Context,
    pub db: Arc<DatabaseService>,
    pub directory: Arc<ClientDirectory>,
    pub deepsearch: Arc<DeepSearchService>,
    pub email: Arc<EmailService>,
    pub sessions: SessionCache,
}

impl AppState {
    pub fn new(
        context: Context,
        db: Arc<DatabaseService>,
        deepsearch: Arc<DeepSearchService>,
        email: Arc<EmailService>,
    ) -> Self {
        let directory = Arc::new(ClientDirectory::new(
            db.clone(),
            Duration::from_secs(context.config.client_cache_secs),
        ));
        let sessions = session_cache(Duration::from_secs(context.config.session_idle_secs));
        Self {
            context,
            db,
            directory,
            deepsearch,
            email,
            sessions,
        }
    }

    fn debounce(&self) -> Duration {
        Duration::from_secs(self.context.config.autosave.debounce_seconds)
    }
}

/// Abandoned sessions are evicted after the idle window; dropping the session
/// drops its auto-save handle, so an unsaved edit still gets flushed.
fn session_cache(idle: Duration) -> SessionCache {
    Cache::builder().max_capacity(1024).time_to_idle(idle).build()
}

pub struct HttpServer;

impl HttpServer {
    pub async fn start(state: AppState) -> Result<(), Box<dyn std::error::Error>> {
        let port = state.context.config.port;
        let app = Router::new()
            .route("/health", get(health_check))
            .route("/estimates", post(create_estimate))
            .route("/estimates/load/{draft_id}", post(load_draft))
            .route("/estimates/{id}", get(get_estimate).patch(update_estimate))
            .route("/estimates/{id}/deepsearch", post(deepsearch_items))
            .route("/estimates/{id}/pdf", post(download_pdf))
            .route("/estimates/{id}/email", post(email_estimate))
            .route("/estimates/{id}/finalize", post(finalize_estimate))
            .route("/clients", get(list_clients).post(create_client))
            .layer(CorsLayer::permissive())
            .with_state(state);

        let listener = TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
        info!("HTTP server running on port {}", port);

        axum::serve(listener, app).await?;
        Ok(())
    }
}

async fn health_check() -> (StatusCode, &'static str) {
    (StatusCode::OK, "OK")
}

fn owner_from_headers(headers: &HeaderMap) -> Result<OwnerContext, ApiError> {
    let raw = headers
        .get("x-owner-id")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| error_response(StatusCode::UNAUTHORIZED, "Missing X-Owner-Id header"))?;
    let owner_id = Uuid::parse_str(raw)
        .map_err(|_| error_response(StatusCode::BAD_REQUEST, "Invalid X-Owner-Id header"))?;
    Ok(OwnerContext::new(owner_id))
}

fn error_response(status: StatusCode, message: &str) -> ApiError {
    (status, Json(json!({ "error": message })))
}

fn validation_response(issues: Vec<crate::estimate::ValidationIssue>) -> ApiError {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(json!({ "error": "validation", "issues": issues })),
    )
}

async fn create_estimate(State(state): State<AppState>, headers: HeaderMap) -> ApiResult {
    let owner = owner_from_headers(&headers)?;
    let estimate = Estimate::new(owner.owner_id);
    let autosave = AutoSave::spawn(
        state.db.clone() as Arc<dyn DraftStore>,
        owner,
        state.debounce(),
        estimate.comparison_snapshot(),
    );

    let response = Json(&estimate).into_response();
    state.sessions.insert(
        estimate.id,
        Arc::new(Mutex::new(EstimateSession::open(estimate, autosave))),
    );
    Ok(response)
}

/// Edit-mode entry: fetch the stored draft, normalize whatever shape it has
/// into a canonical estimate, and open a session over it.
async fn load_draft(
    State(state): State<AppState>,
    Path(draft_id): Path<Uuid>,
    headers: HeaderMap,
) -> ApiResult {
    let owner = owner_from_headers(&headers)?;
    let draft = state
        .db
        .get_draft(draft_id)
        .await
        .map_err(|e| {
            error!("draft lookup failed: {}", e);
            error_response(StatusCode::BAD_GATEWAY, "Could not load draft - please retry")
        })?
        .ok_or_else(|| error_response(StatusCode::NOT_FOUND, "Draft not found"))?;
    let draft = owned_draft(draft, &owner)?;

    let known_clients = state
        .directory
        .clients_for(owner.owner_id)
        .await
        .map(|clients| clients.as_ref().clone())
        .unwrap_or_default();

    let estimate = normalizer::normalize(owner.owner_id, &draft.document, &known_clients);
    let autosave = AutoSave::spawn(
        state.db.clone() as Arc<dyn DraftStore>,
        owner,
        state.debounce(),
        estimate.comparison_snapshot(),
    );

    let response = Json(&estimate).into_response();
    state.sessions.insert(
        estimate.id,
        Arc::new(Mutex::new(EstimateSession::open(estimate, autosave))),
    );
    Ok(response)
}

/// Drafts are only reachable by the owner who created them.
fn owned_draft(draft: EstimateDraft, owner: &OwnerContext) -> Result<EstimateDraft, ApiError> {
    if draft.owner_id == owner.owner_id {
        Ok(draft)
    } else {
        Err(error_response(StatusCode::NOT_FOUND, "Draft not found"))
    }
}

fn session_for(state: &AppState, id: Uuid) -> Result<Arc<Mutex<EstimateSession>>, ApiError> {
    state
        .sessions
        .get(&id)
        .ok_or_else(|| error_response(StatusCode::NOT_FOUND, "Estimate not found"))
}

async fn get_estimate(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult {
    let session = session_for(&state, id)?;
    let session = session.lock().await;
    Ok(Json(&session.estimate).into_response())
}

async fn update_estimate(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(update): Json<EstimateUpdate>,
) -> ApiResult {
    let session = session_for(&state, id)?;
    let mut session = session.lock().await;
    session.apply(update);
    Ok(Json(&session.estimate).into_response())
}

#[derive(Debug, Deserialize)]
struct DeepSearchBody {
    description: String,
}

async fn deepsearch_items(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<DeepSearchBody>,
) -> ApiResult {
    // Generate before taking the session lock; the call can take a while.
    let generated = state
        .deepsearch
        .generate_items(&body.description)
        .await
        .map_err(|e| {
            error!("deepsearch failed: {}", e);
            error_response(
                StatusCode::BAD_GATEWAY,
                "Item generation failed - please try again",
            )
        })?;

    let session = session_for(&state, id)?;
    let mut session = session.lock().await;
    session.add_items(generated.into_line_items());
    Ok(Json(&session.estimate).into_response())
}

#[derive(Debug, Default, Deserialize)]
struct PdfBody {
    #[serde(default)]
    template: PdfTemplate,
}

async fn download_pdf(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Option<Json<PdfBody>>,
) -> ApiResult {
    let Json(body) = body.unwrap_or_default();
    let estimate = snapshot_for_finalization(&state, id).await?;

    let number = estimate_number();
    let bytes = create_estimate_pdf(
        &number,
        &display_date(),
        &estimate,
        &state.context.config.contractor,
        body.template,
        state.context.config.pdf.letterhead.as_deref(),
    )
    .map_err(|e| {
        error!("pdf render failed: {}", e);
        error_response(
            StatusCode::BAD_GATEWAY,
            "PDF generation failed - please try again",
        )
    })?;

    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, "application/pdf")
        .header(
            CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}.pdf\"", number),
        )
        .body(Body::from(bytes))
        .map_err(|e| {
            error!("pdf response failed: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "PDF response failed")
        })
}

#[derive(Debug, Deserialize)]
struct EmailBody {
    to: Option<String>,
    subject: Option<String>,
    body: Option<String>,
    #[serde(default)]
    template: PdfTemplate,
}

async fn email_estimate(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<EmailBody>,
) -> ApiResult {
    let estimate = snapshot_for_finalization(&state, id).await?;

    let recipient = body
        .to
        .or_else(|| estimate.client.as_ref().and_then(|c| c.email.clone()))
        .ok_or_else(|| {
            error_response(StatusCode::UNPROCESSABLE_ENTITY, "No recipient email address")
        })?;

    let number = estimate_number();
    let attachment = create_estimate_pdf(
        &number,
        &display_date(),
        &estimate,
        &state.context.config.contractor,
        body.template,
        state.context.config.pdf.letterhead.as_deref(),
    )
    .map(|bytes| EmailAttachment::from_pdf(&format!("{}.pdf", number), &bytes))
    .map_err(|e| {
        error!("pdf render for email failed: {}", e);
        error_response(
            StatusCode::BAD_GATEWAY,
            "PDF generation failed - please try again",
        )
    })?;

    let request = EmailRequest {
        to: recipient,
        subject: body
            .subject
            .unwrap_or_else(|| format!("Estimate {}", number)),
        body: body
            .body
            .unwrap_or_else(|| "Please find your estimate attached.".to_string()),
        estimate: estimate.to_document(),
        attachment: Some(attachment),
    };

    let outcome = state.email.send_estimate(&request).await.map_err(|e| {
        error!("email send failed: {}", e);
        error_response(
            StatusCode::BAD_GATEWAY,
            "Email delivery failed - please try again",
        )
    })?;

    Ok(Json(json!({
        "delivered": outcome.delivered,
        "demo_mode": outcome.demo_mode,
        "message": outcome.message,
    }))
    .into_response())
}

async fn finalize_estimate(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult {
    let session = session_for(&state, id)?;
    let mut session = session.lock().await;
    session
        .estimate
        .finalize()
        .map_err(validation_response)?;
    Ok(Json(&session.estimate).into_response())
}

async fn list_clients(State(state): State<AppState>, headers: HeaderMap) -> ApiResult {
    let owner = owner_from_headers(&headers)?;
    let clients = state
        .directory
        .clients_for(owner.owner_id)
        .await
        .map_err(|e| {
            error!("client list failed: {}", e);
            error_response(StatusCode::BAD_GATEWAY, "Could not load clients - please retry")
        })?;
    Ok(Json(clients.as_ref()).into_response())
}

#[derive(Debug, Deserialize)]
struct ClientBody {
    name: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    phone: Option<String>,
    #[serde(default)]
    mobile_phone: Option<String>,
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    postal_code: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    classification: ClientKind,
    #[serde(default)]
    notes: Option<String>,
}

async fn create_client(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<ClientBody>,
) -> ApiResult {
    let owner = owner_from_headers(&headers)?;
    if body.name.trim().is_empty() {
        return Err(error_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            "Client name is required",
        ));
    }

    let id = state
        .directory
        .add_client(NewClient {
            owner_id: owner.owner_id,
            name: body.name,
            email: body.email,
            phone: body.phone,
            mobile_phone: body.mobile_phone,
            address: body.address,
            city: body.city,
            postal_code: body.postal_code,
            tags: body.tags,
            classification: body.classification,
            notes: body.notes,
        })
        .await
        .map_err(|e| {
            error!("client insert failed: {}", e);
            error_response(StatusCode::BAD_GATEWAY, "Could not save client - please retry")
        })?;

    Ok((StatusCode::CREATED, Json(json!({ "id": id }))).into_response())
}

/// Finalization actions (PDF, email) validate the same way the wizard's last
/// step does, then work on a clone so the session lock is not held across
/// rendering or network calls.
async fn snapshot_for_finalization(state: &AppState, id: Uuid) -> Result<Estimate, ApiError> {
    let session = session_for(state, id)?;
    let session = session.lock().await;
    let issues = session.estimate.validate_for_finalize();
    if !issues.is_empty() {
        return Err(validation_response(issues));
    }
    Ok(session.estimate.clone())
}

fn estimate_number() -> String {
    let date = Local::now().date_naive().format("%Y%m%d");
    let mut random_gen = rand::rng();
    let random_num = random_gen.random_range(1000..=9999);
    format!("E-{}-{}", date, random_num)
}

fn display_date() -> String {
    let now = Local::now();
    let day = now.day();
    let suffix = match day {
        1 | 21 | 31 => "st",
        2 | 22 => "nd",
        3 | 23 => "rd",
        _ => "th",
    };
    format!("{}{} {}, {}", day, suffix, now.format("%B"), now.year())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::errors::DatabaseError;
    use crate::database::types::NewEstimateDraft;
    use async_trait::async_trait;

    struct NoopStore;

    #[async_trait]
    impl DraftStore for NoopStore {
        async fn find_draft(
            &self,
            _owner_id: Uuid,
            _client_name: &str,
        ) -> Result<Option<EstimateDraft>, DatabaseError> {
            Ok(None)
        }

        async fn get_draft(&self, _id: Uuid) -> Result<Option<EstimateDraft>, DatabaseError> {
            Ok(None)
        }

        async fn list_drafts(&self, _owner_id: Uuid) -> Result<Vec<EstimateDraft>, DatabaseError> {
            Ok(Vec::new())
        }

        async fn insert_draft(&self, _draft: NewEstimateDraft) -> Result<Uuid, DatabaseError> {
            Ok(Uuid::new_v4())
        }

        async fn update_draft(&self, _id: Uuid, _document: &Value) -> Result<(), DatabaseError> {
            Ok(())
        }
    }

    fn draft_row(owner_id: Uuid) -> EstimateDraft {
        EstimateDraft {
            id: Uuid::new_v4(),
            owner_id,
            client_name: None,
            document: json!({}),
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_foreign_draft_is_not_visible() {
        let owner = OwnerContext::new(Uuid::new_v4());
        assert!(owned_draft(draft_row(owner.owner_id), &owner).is_ok());

        let (status, _) = owned_draft(draft_row(Uuid::new_v4()), &owner).unwrap_err();
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_idle_session_is_evicted() {
        let cache = session_cache(Duration::from_millis(50));
        let owner = OwnerContext::new(Uuid::new_v4());
        let estimate = Estimate::new(owner.owner_id);
        let id = estimate.id;
        let autosave = AutoSave::spawn(
            Arc::new(NoopStore),
            owner,
            Duration::from_secs(3600),
            estimate.comparison_snapshot(),
        );
        cache.insert(
            id,
            Arc::new(Mutex::new(EstimateSession::open(estimate, autosave))),
        );
        assert!(cache.get(&id).is_some());

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(cache.get(&id).is_none());
    }

    #[test]
    fn test_estimate_number_format() {
        let number = estimate_number();
        let parts: Vec<&str> = number.split('-').collect();

        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "E");
        assert_eq!(parts[1].len(), 8);
        let suffix: u32 = parts[2].parse().unwrap();
        assert!((1000..=9999).contains(&suffix));
    }

    #[test]
    fn test_display_date_has_ordinal_suffix() {
        let date = display_date();
        assert!(
            date.contains("st ") || date.contains("nd ") || date.contains("rd ") || date.contains("th ")
        );
    }
}
