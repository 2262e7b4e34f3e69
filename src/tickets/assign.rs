use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use diesel::prelude::*;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::auth::identity::CurrentUser;
use crate::error::ApiError;
use crate::permissions::can_assign;
use crate::shared::extract::ApiJson;
use crate::shared::models::{Role, User};
use crate::shared::schema::{tickets, users};
use crate::shared::state::AppState;
use crate::tickets::{load_ticket, record_timeline, TicketStatus};

#[derive(Debug, Deserialize)]
pub struct AssignRequest {
    pub agent_id: Uuid,
}

fn assignment_action(username: &str) -> String {
    format!("Assigned to {username}")
}

pub async fn assign_ticket(
    State(state): State<Arc<AppState>>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
    ApiJson(req): ApiJson<AssignRequest>,
) -> Result<Json<Value>, ApiError> {
    if !can_assign(&actor) {
        return Err(ApiError::Forbidden);
    }

    let mut conn = state.conn.get()?;
    let mut ticket = load_ticket(&mut conn, id)?;

    let agent: User = users::table
        .find(req.agent_id)
        .first::<User>(&mut conn)
        .optional()?
        .filter(|u| u.role() == Role::Agent)
        .ok_or(ApiError::NotFound("Agent"))?;

    ticket.assigned_to = Some(agent.id);
    ticket.status = TicketStatus::Assigned.as_str().to_string();
    ticket.version += 1;
    ticket.updated_at = Utc::now();

    conn.transaction::<_, ApiError, _>(|conn| {
        diesel::update(tickets::table.find(id))
            .set(&ticket)
            .execute(conn)?;
        record_timeline(conn, id, actor.id, &assignment_action(&agent.username))?;
        Ok(())
    })?;

    Ok(Json(json!({
        "detail": "Ticket assigned",
        "assigned_to": agent.username,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeline_action_names_the_agent() {
        assert_eq!(assignment_action("agent1"), "Assigned to agent1");
    }
}
