use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use funnel_core::board::BoardStore;
use funnel_core::mutation::CardPatch;
use funnel_core::types::{LeadCard, UploadedFile};
use serde::Deserialize;
use serde_json::json;

use super::{api_error, board_error_status, not_found, unauthenticated, ApiError};
use crate::state::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssigneeBody {
    #[serde(default)]
    member_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageBody {
    stage_id: String,
}

#[derive(Deserialize)]
pub struct TierBody {
    tier: String,
}

#[derive(Deserialize)]
pub struct PhaseBody {
    #[serde(default)]
    phase: Option<String>,
}

#[derive(Deserialize)]
pub struct NoteBody {
    text: String,
    #[serde(default)]
    attachments: Vec<UploadedFile>,
}

/// Save the "add card" form. The card lands on the board before the remote
/// write; a failed write answers 502 with the card still included.
pub async fn create_card(
    State(state): State<AppState>,
    Json(patch): Json<CardPatch>,
) -> Result<(StatusCode, Json<serde_json::Value>), (StatusCode, Json<serde_json::Value>)> {
    let reject = |status: StatusCode, error: String| {
        log::warn!(target: "funnel.api.create_card", "{}", error);
        (status, Json(json!({ "error": error })))
    };

    let (pending, pipeline_id) = {
        let mut board = state.board();
        let stage_id = match patch.stage_id.clone() {
            Some(stage_id) => stage_id,
            None => match board.state().stages.first() {
                Some(stage) => stage.id.clone(),
                None => {
                    return Err(reject(
                        StatusCode::UNPROCESSABLE_ENTITY,
                        "Board has no stages".into(),
                    ))
                }
            },
        };
        let mut draft = board.new_draft(&stage_id);
        patch.fill_draft(&mut draft);
        let pending = board
            .save_draft(draft)
            .map_err(|e| reject(board_error_status(&e), e.to_string()))?;
        (pending, board.pipeline_id().to_string())
    };
    state.board_changed(&pipeline_id);

    let card_id = pending.card_id.clone();
    let outcome = pending.confirmed().await;
    let card = find_card(&state.board(), &card_id);
    match outcome {
        Ok(_) => Ok((StatusCode::CREATED, Json(json!(card)))),
        Err(e) => {
            let error = e.to_string();
            log::error!(target: "funnel.api.create_card", "{}", error);
            Err((StatusCode::BAD_GATEWAY, Json(json!({ "error": error, "card": card }))))
        }
    }
}

pub async fn update_card(
    State(state): State<AppState>,
    Path(card_id): Path<String>,
    Json(patch): Json<CardPatch>,
) -> Result<Json<LeadCard>, ApiError> {
    run_card_op(&state, "funnel.api.update_card", &card_id, |board| {
        board.update_card(&card_id, patch)
    })
}

pub async fn take_card(
    State(state): State<AppState>,
    Path(card_id): Path<String>,
) -> Result<Json<LeadCard>, ApiError> {
    run_card_op(&state, "funnel.api.take_card", &card_id, |board| {
        board.take_card(&card_id)
    })
}

pub async fn change_assignee(
    State(state): State<AppState>,
    Path(card_id): Path<String>,
    Json(body): Json<AssigneeBody>,
) -> Result<Json<LeadCard>, ApiError> {
    run_card_op(&state, "funnel.api.change_assignee", &card_id, |board| {
        board.change_assignee(&card_id, body.member_id.as_deref())
    })
}

pub async fn change_stage(
    State(state): State<AppState>,
    Path(card_id): Path<String>,
    Json(body): Json<StageBody>,
) -> Result<Json<LeadCard>, ApiError> {
    if !state.board().state().stages.iter().any(|s| s.id == body.stage_id) {
        return Err(api_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "funnel.api.change_stage",
            format!("Unknown stage: {}", body.stage_id),
        ));
    }
    run_card_op(&state, "funnel.api.change_stage", &card_id, |board| {
        board.change_stage(&card_id, &body.stage_id)
    })
}

pub async fn change_tier(
    State(state): State<AppState>,
    Path(card_id): Path<String>,
    Json(body): Json<TierBody>,
) -> Result<Json<LeadCard>, ApiError> {
    run_card_op(&state, "funnel.api.change_tier", &card_id, |board| {
        board.change_tier(&card_id, &body.tier)
    })
}

pub async fn change_activity_phase(
    State(state): State<AppState>,
    Path(card_id): Path<String>,
    Json(body): Json<PhaseBody>,
) -> Result<Json<LeadCard>, ApiError> {
    run_card_op(&state, "funnel.api.change_phase", &card_id, |board| {
        board.change_activity_phase(&card_id, body.phase.as_deref())
    })
}

pub async fn add_note(
    State(state): State<AppState>,
    Path(card_id): Path<String>,
    Json(body): Json<NoteBody>,
) -> Result<Json<LeadCard>, ApiError> {
    if body.text.trim().is_empty() && body.attachments.is_empty() {
        return Err(api_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "funnel.api.add_note",
            "Note needs text or an attachment".into(),
        ));
    }
    run_card_op(&state, "funnel.api.add_note", &card_id, |board| {
        board.add_note(&card_id, &body.text, body.attachments)
    })
}

pub async fn delete_card(
    State(state): State<AppState>,
    Path(card_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let (deleted, pipeline_id) = {
        let mut board = state.board();
        (board.delete_card(&card_id), board.pipeline_id().to_string())
    };
    if !deleted {
        return Err(not_found("funnel.api.delete_card", "Card", &card_id));
    }
    state.board_changed(&pipeline_id);
    Ok(StatusCode::NO_CONTENT)
}

fn find_card(board: &BoardStore, card_id: &str) -> Option<LeadCard> {
    board.state().cards.get(card_id).cloned()
}

/// Run an audited card operation and answer with the card as it now stands.
/// An operation that changed nothing still answers with the card.
fn run_card_op(
    state: &AppState,
    target: &'static str,
    card_id: &str,
    op: impl FnOnce(&mut BoardStore) -> bool,
) -> Result<Json<LeadCard>, ApiError> {
    let (changed, card, pipeline_id) = {
        let mut board = state.board();
        if board.actor().is_none() {
            return Err(unauthenticated(target));
        }
        if find_card(&board, card_id).is_none() {
            return Err(not_found(target, "Card", card_id));
        }
        let changed = op(&mut board);
        (changed, find_card(&board, card_id), board.pipeline_id().to_string())
    };
    if changed {
        state.board_changed(&pipeline_id);
    }
    card.map(Json)
        .ok_or_else(|| not_found(target, "Card", card_id))
}
