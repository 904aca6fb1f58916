use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use funnel_core::drag::{DragOutcome, DragResult, RawDragResult};
use funnel_core::types::{BoardState, PaletteColor, Section, Stage};
use serde::Deserialize;
use serde_json::json;

use super::{api_error, not_found, ApiError};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct NewNamedBody {
    name: String,
    #[serde(default)]
    color: PaletteColor,
}

#[derive(Deserialize)]
pub struct EditNamedBody {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    color: Option<PaletteColor>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageOrderBody {
    stage_ids: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionOrderBody {
    section_ids: Vec<String>,
}

pub async fn get_board(State(state): State<AppState>) -> Json<serde_json::Value> {
    let board = state.board();
    Json(json!({
        "pipelineId": board.pipeline_id(),
        "synced": board.is_synced(),
        "localOnly": state.local_only,
        "board": board.state(),
    }))
}

pub async fn apply_drag(
    State(state): State<AppState>,
    Json(raw): Json<RawDragResult>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let gesture = DragResult::try_from(raw).map_err(|e| {
        api_error(StatusCode::BAD_REQUEST, "funnel.api.drag", e.to_string())
    })?;

    let (outcome, pipeline_id) = {
        let mut board = state.board();
        let outcome = board.apply_drag(&gesture);
        (outcome, board.pipeline_id().to_string())
    };
    let changed = outcome != DragOutcome::NoOp;
    if changed {
        state.board_changed(&pipeline_id);
    }
    Ok(Json(json!({ "changed": changed })))
}

// ── Stages ──────────────────────────────────────────────────────────────

pub async fn add_stage(
    State(state): State<AppState>,
    Json(body): Json<NewNamedBody>,
) -> Result<(StatusCode, Json<Stage>), ApiError> {
    let name = body.name.trim();
    if name.is_empty() {
        return Err(api_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "funnel.api.add_stage",
            "Stage name is required".into(),
        ));
    }
    let (stage, pipeline_id) = {
        let mut board = state.board();
        (board.add_stage(name, body.color), board.pipeline_id().to_string())
    };
    state.board_changed(&pipeline_id);
    Ok((StatusCode::CREATED, Json(stage)))
}

pub async fn edit_stage(
    State(state): State<AppState>,
    Path(stage_id): Path<String>,
    Json(body): Json<EditNamedBody>,
) -> Result<Json<Stage>, ApiError> {
    let (stage, pipeline_id) = {
        let mut board = state.board();
        board.rename_or_recolor_stage(&stage_id, body.name.as_deref(), body.color);
        (
            board.state().stage(&stage_id).cloned(),
            board.pipeline_id().to_string(),
        )
    };
    let stage = stage.ok_or_else(|| not_found("funnel.api.edit_stage", "Stage", &stage_id))?;
    state.board_changed(&pipeline_id);
    Ok(Json(stage))
}

pub async fn delete_stage(
    State(state): State<AppState>,
    Path(stage_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let (deleted, pipeline_id) = {
        let mut board = state.board();
        (board.delete_stage(&stage_id), board.pipeline_id().to_string())
    };
    if !deleted {
        return Err(not_found("funnel.api.delete_stage", "Stage", &stage_id));
    }
    state.board_changed(&pipeline_id);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn reorder_stages(
    State(state): State<AppState>,
    Json(body): Json<StageOrderBody>,
) -> Json<BoardState> {
    let (changed, snapshot, pipeline_id) = {
        let mut board = state.board();
        let changed = board.reorder_stages(&body.stage_ids);
        (changed, board.snapshot(), board.pipeline_id().to_string())
    };
    if changed {
        state.board_changed(&pipeline_id);
    }
    Json(snapshot)
}

// ── Sections ────────────────────────────────────────────────────────────

pub async fn add_section(
    State(state): State<AppState>,
    Path(stage_id): Path<String>,
    Json(body): Json<NewNamedBody>,
) -> Result<(StatusCode, Json<Section>), ApiError> {
    let (section, pipeline_id) = {
        let mut board = state.board();
        (
            board.add_section(&stage_id, body.name.trim(), body.color),
            board.pipeline_id().to_string(),
        )
    };
    let section = section.ok_or_else(|| not_found("funnel.api.add_section", "Stage", &stage_id))?;
    state.board_changed(&pipeline_id);
    Ok((StatusCode::CREATED, Json(section)))
}

pub async fn edit_section(
    State(state): State<AppState>,
    Path((stage_id, section_id)): Path<(String, String)>,
    Json(body): Json<EditNamedBody>,
) -> Result<Json<Section>, ApiError> {
    let (section, pipeline_id) = {
        let mut board = state.board();
        board.edit_section(&stage_id, &section_id, body.name.as_deref(), body.color);
        let section = board
            .state()
            .lane(&stage_id)
            .and_then(|lane| lane.section(&section_id))
            .cloned();
        (section, board.pipeline_id().to_string())
    };
    let section =
        section.ok_or_else(|| not_found("funnel.api.edit_section", "Section", &section_id))?;
    state.board_changed(&pipeline_id);
    Ok(Json(section))
}

pub async fn delete_section(
    State(state): State<AppState>,
    Path((stage_id, section_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let (deleted, pipeline_id) = {
        let mut board = state.board();
        (
            board.delete_section(&stage_id, &section_id),
            board.pipeline_id().to_string(),
        )
    };
    if !deleted {
        return Err(not_found("funnel.api.delete_section", "Section", &section_id));
    }
    state.board_changed(&pipeline_id);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn reorder_sections(
    State(state): State<AppState>,
    Path(stage_id): Path<String>,
    Json(body): Json<SectionOrderBody>,
) -> Result<Json<Vec<Section>>, ApiError> {
    let (changed, sections, pipeline_id) = {
        let mut board = state.board();
        let changed = board.reorder_sections(&stage_id, &body.section_ids);
        let sections = board.state().lane(&stage_id).map(|lane| lane.sections.clone());
        (changed, sections, board.pipeline_id().to_string())
    };
    let sections =
        sections.ok_or_else(|| not_found("funnel.api.reorder_sections", "Stage", &stage_id))?;
    if changed {
        state.board_changed(&pipeline_id);
    }
    Ok(Json(sections))
}
