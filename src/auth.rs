use std::sync::Arc;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{extract::FromRequestParts, http::request::Parts};
use axum_extra::extract::CookieJar;
use rand::RngCore;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};

use crate::{
    AppState,
    entities::{group, session, user, user_group},
    error::{AppError, AppResult},
    policy::Actor,
};

pub const SESSION_COOKIE: &str = "cinelog_session";

pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| AppError::Internal(anyhow::anyhow!("password hashing failed: {e}")))
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok())
        .unwrap_or(false)
}

fn new_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub fn now_sec() -> i64 {
    jiff::Timestamp::now().as_second()
}

/// Verify credentials and open a session. Bad credentials and deactivated
/// accounts both come back as `Unauthenticated` so the response does not
/// leak which one it was.
pub async fn login(
    db: &DatabaseConnection,
    username: &str,
    password: &str,
    ttl_hours: i64,
) -> AppResult<(user::Model, session::Model)> {
    let Some(found) =
        user::Entity::find().filter(user::Column::Username.eq(username)).one(db).await?
    else {
        return Err(AppError::Unauthenticated);
    };
    if !found.is_active || !verify_password(password, &found.password_hash) {
        tracing::warn!(username, "failed login attempt");
        return Err(AppError::Unauthenticated);
    }

    let now = now_sec();
    let created = session::ActiveModel {
        token: Set(new_token()),
        user_id: Set(found.id),
        created_at: Set(now),
        expires_at: Set(now + ttl_hours * 3600),
    }
    .insert(db)
    .await?;

    tracing::info!(username, "logged in");
    Ok((found, created))
}

pub async fn logout(db: &DatabaseConnection, token: &str) -> AppResult<()> {
    session::Entity::delete_by_id(token.to_string()).exec(db).await?;
    Ok(())
}

pub async fn group_names(db: &DatabaseConnection, user_id: i32) -> AppResult<Vec<String>> {
    let memberships =
        user_group::Entity::find().filter(user_group::Column::UserId.eq(user_id)).all(db).await?;
    let group_ids: Vec<i32> = memberships.iter().map(|m| m.group_id).collect();
    if group_ids.is_empty() {
        return Ok(Vec::new());
    }
    let groups =
        group::Entity::find().filter(group::Column::Id.is_in(group_ids)).all(db).await?;
    Ok(groups.into_iter().map(|g| g.name).collect())
}

/// Resolve a session token into an `Actor`. Expired sessions are removed
/// on sight; deactivated users resolve to nothing.
pub async fn resolve_actor(db: &DatabaseConnection, token: &str) -> AppResult<Option<Actor>> {
    let Some(sess) = session::Entity::find_by_id(token.to_string()).one(db).await? else {
        return Ok(None);
    };
    if sess.expires_at <= now_sec() {
        session::Entity::delete_by_id(sess.token).exec(db).await?;
        return Ok(None);
    }
    let Some(found) = user::Entity::find_by_id(sess.user_id).one(db).await? else {
        return Ok(None);
    };
    if !found.is_active {
        return Ok(None);
    }
    let groups = group_names(db, found.id).await?;
    Ok(Some(Actor {
        id: found.id,
        username: found.username,
        is_staff: found.is_staff,
        is_superuser: found.is_superuser,
        groups,
    }))
}

async fn actor_from_parts(parts: &mut Parts, state: &Arc<AppState>) -> AppResult<Option<Actor>> {
    let jar = match CookieJar::from_request_parts(parts, state).await {
        Ok(jar) => jar,
        Err(never) => match never {},
    };
    let Some(cookie) = jar.get(SESSION_COOKIE) else {
        return Ok(None);
    };
    resolve_actor(&state.db, cookie.value()).await
}

impl FromRequestParts<Arc<AppState>> for Actor {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        actor_from_parts(parts, state).await?.ok_or(AppError::Unauthenticated)
    }
}

/// Optional-auth extractor for public endpoints that show extra detail to
/// a signed-in caller.
pub struct MaybeActor(pub Option<Actor>);

impl FromRequestParts<Arc<AppState>> for MaybeActor {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        Ok(MaybeActor(actor_from_parts(parts, state).await?))
    }
}
