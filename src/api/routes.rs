//! HTTP route handlers for Axum.

use std::path::Path as FsPath;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use tracing::{error, warn};
use walkdir::WalkDir;

use crate::{
    api::types::{
        BinaryZeroShotInput, MessageDto, TaskResponse, TranslationInput, ZeroShotInput,
    },
    error::NlpError,
    nlp::{
        self,
        beam::MAX_NUM_BEAMS,
        format::{BinaryResults, ZeroShotResults},
        models::{EntitySpan, QaAnswer, QaInput},
        registry::ModelRegistry,
        Dispatch,
    },
};

use super::AppState;

type ApiResult<T> = Result<Json<T>, (StatusCode, String)>;

const DEFAULT_NUM_BEAMS: usize = 50;

#[derive(Debug, Deserialize)]
pub struct TranslateQuery {
    #[serde(default = "default_num_beams")]
    pub num_beams: usize,
}

#[derive(Debug, Deserialize)]
pub struct ZeroShotQuery {
    #[serde(default = "default_true")]
    pub format_results: bool,
}

#[derive(Debug, Deserialize)]
pub struct BinaryZeroShotQuery {
    #[serde(default)]
    pub raw_scores: bool,
    #[serde(default = "default_threshold")]
    pub threshold: f64,
}

fn default_num_beams() -> usize {
    DEFAULT_NUM_BEAMS
}

fn default_true() -> bool {
    true
}

fn default_threshold() -> f64 {
    0.5
}

pub async fn ping() -> Json<MessageDto> {
    Json(MessageDto::new("Pong!"))
}

pub async fn list_models(states: State<AppState>) -> ApiResult<Vec<String>> {
    let root = states.settings.nlp_root.clone();
    let names = tokio::task::spawn_blocking(move || list_model_dirs(&root))
        .await
        .map_err(internal)?;
    Ok(Json(names))
}

/// Sorted names of the directories directly under `root`.
pub fn list_model_dirs(root: &FsPath) -> Vec<String> {
    if !root.is_dir() {
        warn!(root = %root.display(), "model root missing");
        return Vec::new();
    }
    WalkDir::new(root)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_dir())
        .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
        .collect()
}

pub async fn translate(
    Path(model): Path<String>,
    states: State<AppState>,
    Query(query): Query<TranslateQuery>,
    Json(input): Json<TranslationInput>,
) -> ApiResult<TaskResponse<String>> {
    if query.num_beams > MAX_NUM_BEAMS {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("num_beams must be at most {MAX_NUM_BEAMS}"),
        ));
    }
    run_blocking(&states, move |registry| {
        nlp::translate(registry, &model, &input.text, query.num_beams)
    })
    .await
}

pub async fn entity_recognition(
    states: State<AppState>,
    Json(documents): Json<Vec<String>>,
) -> ApiResult<TaskResponse<Vec<Vec<EntitySpan>>>> {
    run_blocking(&states, move |registry| {
        nlp::entity_recognition(registry, &documents)
    })
    .await
}

pub async fn question_answering(
    states: State<AppState>,
    Json(input): Json<QaInput>,
) -> ApiResult<TaskResponse<QaAnswer>> {
    run_blocking(&states, move |registry| {
        nlp::question_answering(registry, &input)
    })
    .await
}

pub async fn zero_shot(
    states: State<AppState>,
    Query(query): Query<ZeroShotQuery>,
    Json(input): Json<ZeroShotInput>,
) -> ApiResult<TaskResponse<ZeroShotResults>> {
    let documents = input.documents.into_vec();
    let topics = input.topics.into_vec();
    run_blocking(&states, move |registry| {
        nlp::zero_shot(registry, &documents, &topics, query.format_results)
    })
    .await
}

pub async fn binary_zero_shot(
    states: State<AppState>,
    Query(query): Query<BinaryZeroShotQuery>,
    Json(input): Json<BinaryZeroShotInput>,
) -> ApiResult<TaskResponse<BinaryResults>> {
    let documents = input.documents.into_vec();
    run_blocking(&states, move |registry| {
        nlp::binary_zero_shot(
            registry,
            &documents,
            &input.topic,
            query.raw_scores,
            query.threshold,
        )
    })
    .await
}

/// Run a dispatcher on the blocking pool and map its outcome to a response.
async fn run_blocking<T, F>(states: &AppState, task: F) -> ApiResult<TaskResponse<T>>
where
    T: Send + 'static,
    F: FnOnce(&ModelRegistry) -> Result<Dispatch<T>, NlpError> + Send + 'static,
{
    let registry = states.registry.clone();
    let outcome = tokio::task::spawn_blocking(move || task(&registry))
        .await
        .map_err(internal)?;
    match outcome {
        Ok(dispatch) => Ok(Json(dispatch.into())),
        Err(err) => {
            error!(error = %err, "inference failed");
            Err(internal(err))
        }
    }
}

fn internal(err: impl std::fmt::Display) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}
