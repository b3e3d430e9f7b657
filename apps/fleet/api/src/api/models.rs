//! Operator-uploaded decision-model artifacts.
//!
//! Artifacts are opaque files on a local path, referenced by version through
//! a JSON index; activation flips the index's `active` marker, which readers
//! pick up on next access.

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
};
use axum_helpers::{AppError, Identity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub version: String,
    pub file: String,
    pub size_bytes: u64,
    pub uploaded_at: DateTime<Utc>,
    pub active: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ModelIndex {
    artifacts: Vec<ModelArtifact>,
}

#[derive(Clone)]
struct ModelStore {
    dir: PathBuf,
}

impl ModelStore {
    fn index_path(&self) -> PathBuf {
        self.dir.join("index.json")
    }

    async fn load(&self) -> Result<ModelIndex, AppError> {
        match tokio::fs::read(self.index_path()).await {
            Ok(raw) => serde_json::from_slice(&raw)
                .map_err(|e| AppError::InternalServerError(format!("corrupt model index: {}", e))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ModelIndex::default()),
            Err(e) => Err(AppError::InternalServerError(format!(
                "model index unreadable: {}",
                e
            ))),
        }
    }

    async fn save(&self, index: &ModelIndex) -> Result<(), AppError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| AppError::InternalServerError(e.to_string()))?;
        let raw = serde_json::to_vec_pretty(index)
            .map_err(|e| AppError::InternalServerError(e.to_string()))?;
        tokio::fs::write(self.index_path(), raw)
            .await
            .map_err(|e| AppError::InternalServerError(e.to_string()))
    }
}

pub fn router(dir: &std::path::Path) -> Router {
    let store = Arc::new(ModelStore {
        dir: dir.to_path_buf(),
    });

    Router::new()
        .route("/", get(list_models))
        .route("/{version}", put(upload_model))
        .route("/{version}/activate", post(activate_model))
        .with_state(store)
}

async fn list_models(
    State(store): State<Arc<ModelStore>>,
    identity: Identity,
) -> Result<Json<Vec<ModelArtifact>>, AppError> {
    identity.require_admin()?;
    let index = store.load().await?;
    Ok(Json(index.artifacts))
}

async fn upload_model(
    State(store): State<Arc<ModelStore>>,
    identity: Identity,
    Path(version): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    identity.require_admin()?;

    if version.is_empty() || !version.chars().all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-') {
        return Err(AppError::BadRequest(format!(
            "invalid model version '{}'",
            version
        )));
    }
    if body.is_empty() {
        return Err(AppError::BadRequest("empty model artifact".to_string()));
    }

    let file = format!("model-{}.bin", version);
    tokio::fs::create_dir_all(&store.dir)
        .await
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;
    tokio::fs::write(store.dir.join(&file), &body)
        .await
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;

    let mut index = store.load().await?;
    index.artifacts.retain(|a| a.version != version);
    index.artifacts.push(ModelArtifact {
        version: version.clone(),
        file,
        size_bytes: body.len() as u64,
        uploaded_at: Utc::now(),
        active: false,
    });
    store.save(&index).await?;

    tracing::info!(version, size = body.len(), "Model artifact uploaded");
    Ok(StatusCode::CREATED)
}

async fn activate_model(
    State(store): State<Arc<ModelStore>>,
    identity: Identity,
    Path(version): Path<String>,
) -> Result<Json<ModelArtifact>, AppError> {
    identity.require_admin()?;

    let mut index = store.load().await?;
    if !index.artifacts.iter().any(|a| a.version == version) {
        return Err(AppError::NotFound(format!("model version {}", version)));
    }

    for artifact in &mut index.artifacts {
        artifact.active = artifact.version == version;
    }
    store.save(&index).await?;

    let active = index
        .artifacts
        .into_iter()
        .find(|a| a.version == version)
        .expect("just activated");

    tracing::info!(version, "Model artifact activated");
    Ok(Json(active))
}
