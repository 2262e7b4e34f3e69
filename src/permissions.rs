//! Pure permission decisions. No side effects, no caching: every request
//! evaluates these afresh against the actor and ticket it loaded.

use std::collections::HashSet;

use crate::shared::models::{Role, User};
use crate::tickets::Ticket;

/// The ticket fields a PATCH may touch. Identity, version, and timestamps
/// are never writable through the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TicketField {
    Title,
    Description,
    Priority,
    SlaHours,
    Status,
}

impl TicketField {
    pub fn all() -> HashSet<Self> {
        HashSet::from([
            Self::Title,
            Self::Description,
            Self::Priority,
            Self::SlaHours,
            Self::Status,
        ])
    }
}

pub fn can_view_ticket(actor: &User, ticket: &Ticket) -> bool {
    if actor.is_superuser {
        return true;
    }
    match actor.role() {
        Role::User => ticket.created_by == actor.id,
        Role::Agent => ticket.assigned_to == Some(actor.id),
        Role::Admin => false,
    }
}

/// Admins edit everything, the owning user edits the descriptive fields,
/// the assigned agent edits only status. An empty set means the update is
/// denied outright.
pub fn fields_editable(actor: &User, ticket: &Ticket) -> HashSet<TicketField> {
    if actor.is_superuser {
        return TicketField::all();
    }
    match actor.role() {
        Role::User if ticket.created_by == actor.id => HashSet::from([
            TicketField::Title,
            TicketField::Description,
            TicketField::Priority,
            TicketField::SlaHours,
        ]),
        Role::Agent if ticket.assigned_to == Some(actor.id) => {
            HashSet::from([TicketField::Status])
        }
        _ => HashSet::new(),
    }
}

pub fn can_assign(actor: &User) -> bool {
    actor.is_superuser
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn user_with_role(role: &str, is_superuser: bool) -> User {
        User {
            id: Uuid::new_v4(),
            username: format!("{role}-actor"),
            email: format!("{role}@example.com"),
            password_hash: "x".into(),
            role: role.into(),
            is_superuser,
            created_at: Utc::now(),
        }
    }

    fn ticket_of(creator: &User) -> Ticket {
        let now = Utc::now();
        Ticket {
            id: Uuid::new_v4(),
            title: "Printer on fire".into(),
            description: "Smoke everywhere".into(),
            priority: "normal".into(),
            sla_hours: 24,
            status: "open".into(),
            created_by: creator.id,
            assigned_to: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn owner_and_superuser_can_view() {
        let owner = user_with_role("user", false);
        let admin = user_with_role("admin", true);
        let stranger = user_with_role("user", false);
        let ticket = ticket_of(&owner);

        assert!(can_view_ticket(&owner, &ticket));
        assert!(can_view_ticket(&admin, &ticket));
        assert!(!can_view_ticket(&stranger, &ticket));
    }

    #[test]
    fn agent_visibility_requires_assignment() {
        let owner = user_with_role("user", false);
        let agent = user_with_role("agent", false);
        let mut ticket = ticket_of(&owner);

        assert!(!can_view_ticket(&agent, &ticket));
        ticket.assigned_to = Some(agent.id);
        assert!(can_view_ticket(&agent, &ticket));
    }

    #[test]
    fn owner_edits_descriptive_fields_only() {
        let owner = user_with_role("user", false);
        let ticket = ticket_of(&owner);
        let editable = fields_editable(&owner, &ticket);

        assert!(editable.contains(&TicketField::Title));
        assert!(editable.contains(&TicketField::Description));
        assert!(editable.contains(&TicketField::Priority));
        assert!(editable.contains(&TicketField::SlaHours));
        assert!(!editable.contains(&TicketField::Status));
    }

    #[test]
    fn assigned_agent_edits_status_only() {
        let owner = user_with_role("user", false);
        let agent = user_with_role("agent", false);
        let mut ticket = ticket_of(&owner);
        ticket.assigned_to = Some(agent.id);

        assert_eq!(
            fields_editable(&agent, &ticket),
            HashSet::from([TicketField::Status])
        );
    }

    #[test]
    fn unassigned_agent_and_stranger_edit_nothing() {
        let owner = user_with_role("user", false);
        let agent = user_with_role("agent", false);
        let stranger = user_with_role("user", false);
        let ticket = ticket_of(&owner);

        assert!(fields_editable(&agent, &ticket).is_empty());
        assert!(fields_editable(&stranger, &ticket).is_empty());
    }

    #[test]
    fn superuser_edits_everything() {
        let owner = user_with_role("user", false);
        let admin = user_with_role("admin", true);
        let ticket = ticket_of(&owner);

        assert_eq!(fields_editable(&admin, &ticket), TicketField::all());
    }

    #[test]
    fn only_superusers_assign() {
        assert!(can_assign(&user_with_role("admin", true)));
        assert!(!can_assign(&user_with_role("admin", false)));
        assert!(!can_assign(&user_with_role("agent", false)));
        assert!(!can_assign(&user_with_role("user", false)));
    }
}
