use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use diesel::prelude::*;
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::identity::CurrentUser;
use crate::error::{ApiError, ValidationErrors};
use crate::permissions::can_view_ticket;
use crate::shared::extract::ApiJson;
use crate::shared::schema::ticket_comments;
use crate::shared::state::AppState;
use crate::tickets::{load_ticket, record_timeline, Comment, CommentView};

#[derive(Debug, Default, Deserialize)]
pub struct AddCommentRequest {
    pub content: Option<String>,
}

fn validate_comment(req: &AddCommentRequest) -> Result<String, ApiError> {
    let content = req.content.as_deref().unwrap_or_default().trim();
    if content.is_empty() {
        let mut errors = ValidationErrors::new();
        errors.add("content", "This field is required");
        errors.into_result()?;
    }
    Ok(content.to_string())
}

/// Commenting is gated on visibility, not on edit rights: anyone who can
/// read a ticket can discuss it.
pub async fn add_comment(
    State(state): State<Arc<AppState>>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
    ApiJson(req): ApiJson<AddCommentRequest>,
) -> Result<(StatusCode, Json<CommentView>), ApiError> {
    let content = validate_comment(&req)?;
    let mut conn = state.conn.get()?;
    let ticket = load_ticket(&mut conn, id)?;

    if !can_view_ticket(&actor, &ticket) {
        return Err(ApiError::Forbidden);
    }

    let comment = Comment {
        id: Uuid::new_v4(),
        ticket_id: ticket.id,
        user_id: actor.id,
        content,
        created_at: Utc::now(),
    };

    conn.transaction::<_, ApiError, _>(|conn| {
        diesel::insert_into(ticket_comments::table)
            .values(&comment)
            .execute(conn)?;
        record_timeline(conn, ticket.id, actor.id, "Comment added")?;
        Ok(())
    })?;

    let view = CommentView {
        id: comment.id,
        ticket: comment.ticket_id,
        user: actor.username,
        content: comment.content,
        created_at: comment.created_at,
    };
    Ok((StatusCode::CREATED, Json(view)))
}
