use chrono::Utc;
use diesel::prelude::*;
use uuid::Uuid;

use crate::auth::password::hash_password;
use crate::shared::models::{Role, User};
use crate::shared::schema::users;
use crate::shared::utils::DbPool;

pub struct SeedAccount {
    pub username: &'static str,
    pub email: &'static str,
    pub password: &'static str,
    pub role: Role,
    pub is_superuser: bool,
}

const SEED_ACCOUNTS: &[SeedAccount] = &[
    SeedAccount {
        username: "admin",
        email: "admin@example.com",
        password: "adminpass",
        role: Role::Admin,
        is_superuser: true,
    },
    SeedAccount {
        username: "agent1",
        email: "agent1@example.com",
        password: "agentpass",
        role: Role::Agent,
        is_superuser: false,
    },
    SeedAccount {
        username: "user1",
        email: "user1@example.com",
        password: "userpass",
        role: Role::User,
        is_superuser: false,
    },
];

fn seeds_to_create(existing: &[String]) -> Vec<&'static SeedAccount> {
    SEED_ACCOUNTS
        .iter()
        .filter(|seed| !existing.iter().any(|name| name == seed.username))
        .collect()
}

/// Creates the development accounts if they are missing. Running this on
/// every boot is safe: accounts that already exist are left untouched.
pub fn ensure_seed_accounts(pool: &DbPool) -> anyhow::Result<()> {
    let mut conn = pool.get()?;

    let usernames: Vec<&str> = SEED_ACCOUNTS.iter().map(|s| s.username).collect();
    let existing: Vec<String> = users::table
        .filter(users::username.eq_any(&usernames))
        .select(users::username)
        .load(&mut conn)?;

    for seed in seeds_to_create(&existing) {
        let user = User {
            id: Uuid::new_v4(),
            username: seed.username.to_string(),
            email: seed.email.to_string(),
            password_hash: hash_password(seed.password)?,
            role: seed.role.as_str().to_string(),
            is_superuser: seed.is_superuser,
            created_at: Utc::now(),
        };
        diesel::insert_into(users::table)
            .values(&user)
            .execute(&mut conn)?;
        tracing::info!(username = seed.username, role = seed.role.as_str(), "seeded account");
    }
    Ok(())
}
