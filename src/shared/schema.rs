diesel::table! {
    users (id) {
        id -> Uuid,
        username -> Varchar,
        email -> Varchar,
        password_hash -> Text,
        role -> Varchar,
        is_superuser -> Bool,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    tickets (id) {
        id -> Uuid,
        title -> Varchar,
        description -> Text,
        priority -> Varchar,
        sla_hours -> Int4,
        status -> Varchar,
        created_by -> Uuid,
        assigned_to -> Nullable<Uuid>,
        version -> Int4,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    ticket_comments (id) {
        id -> Uuid,
        ticket_id -> Uuid,
        user_id -> Uuid,
        content -> Text,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    ticket_timeline (id) {
        id -> Uuid,
        ticket_id -> Uuid,
        action -> Varchar,
        user_id -> Uuid,
        created_at -> Timestamptz,
    }
}

diesel::joinable!(ticket_comments -> tickets (ticket_id));
diesel::joinable!(ticket_timeline -> tickets (ticket_id));

diesel::allow_tables_to_appear_in_same_query!(users, tickets, ticket_comments, ticket_timeline);
