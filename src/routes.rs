use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use axum_extra::extract::{
    CookieJar,
    cookie::{Cookie, SameSite},
};
use serde_json::{Value, json};

use crate::{
    AppState,
    auth::{self, MaybeActor, SESSION_COOKIE},
    error::AppResult,
    models::{
        CatalogQuery, FavoriteToggle, GroupOut, GroupPayload, HomePage, LoginRequest,
        ModerationDashboard, ModerationQuery, MovieDetail, MovieSummary, Page, ProfileOut,
        ProfileQuery, RatingOut, RatingPayload, RegisterRequest, ReviewOut, ReviewPayload,
        UpdateUserRequest, UserOut,
    },
    policy::Actor,
};

pub async fn register(
    State(state): State<Arc<AppState>>,
    MaybeActor(actor): MaybeActor,
    Json(req): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<UserOut>)> {
    let created = state.gateway.register(actor.as_ref(), req).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(req): Json<LoginRequest>,
) -> AppResult<(CookieJar, Json<UserOut>)> {
    let ttl_hours = state.config.session_ttl_hours;
    let (found, session) = auth::login(&state.db, &req.username, &req.password, ttl_hours).await?;
    let groups = auth::group_names(&state.db, found.id).await?;

    let cookie = Cookie::build((SESSION_COOKIE, session.token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::hours(ttl_hours))
        .build();

    Ok((jar.add(cookie), Json(UserOut::from_model(found, groups))))
}

pub async fn logout(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> AppResult<(CookieJar, Json<Value>)> {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        auth::logout(&state.db, cookie.value()).await?;
    }
    let jar = jar.remove(session_removal_cookie());
    Ok((jar, Json(json!({ "status": "logged out" }))))
}

/// Removal must carry the same path the login cookie was set with, or
/// browsers keep the stale cookie.
fn session_removal_cookie() -> Cookie<'static> {
    Cookie::build(SESSION_COOKIE).path("/").build()
}

pub async fn list_users(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> AppResult<Json<Vec<UserOut>>> {
    Ok(Json(state.gateway.list_users(Some(&actor)).await?))
}

pub async fn get_user(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<i32>,
) -> AppResult<Json<UserOut>> {
    Ok(Json(state.gateway.get_user(Some(&actor), id).await?))
}

pub async fn update_user(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<i32>,
    Json(req): Json<UpdateUserRequest>,
) -> AppResult<Json<UserOut>> {
    Ok(Json(state.gateway.update_user(Some(&actor), id, req).await?))
}

pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<i32>,
) -> AppResult<Json<Value>> {
    state.gateway.delete_user(Some(&actor), id).await?;
    Ok(Json(json!({ "status": "deleted" })))
}

pub async fn profile(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<i32>,
    Query(query): Query<ProfileQuery>,
) -> AppResult<Json<ProfileOut>> {
    Ok(Json(state.gateway.profile(Some(&actor), id, query).await?))
}

pub async fn list_groups(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> AppResult<Json<Vec<GroupOut>>> {
    Ok(Json(state.gateway.list_groups(Some(&actor)).await?))
}

pub async fn create_group(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Json(req): Json<GroupPayload>,
) -> AppResult<(StatusCode, Json<GroupOut>)> {
    let created = state.gateway.create_group(Some(&actor), &req.name).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn get_group(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<i32>,
) -> AppResult<Json<GroupOut>> {
    Ok(Json(state.gateway.get_group(Some(&actor), id).await?))
}

pub async fn update_group(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<i32>,
    Json(req): Json<GroupPayload>,
) -> AppResult<Json<GroupOut>> {
    Ok(Json(state.gateway.update_group(Some(&actor), id, &req.name).await?))
}

pub async fn delete_group(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<i32>,
) -> AppResult<Json<Value>> {
    state.gateway.delete_group(Some(&actor), id).await?;
    Ok(Json(json!({ "status": "deleted" })))
}

pub async fn home(State(state): State<Arc<AppState>>) -> AppResult<Json<HomePage>> {
    Ok(Json(state.gateway.home().await?))
}

pub async fn catalog(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CatalogQuery>,
) -> AppResult<Json<Page<MovieSummary>>> {
    Ok(Json(state.gateway.list_movies(query).await?))
}

pub async fn movie_detail(
    State(state): State<Arc<AppState>>,
    MaybeActor(actor): MaybeActor,
    Path(id): Path<i32>,
) -> AppResult<Json<MovieDetail>> {
    Ok(Json(state.gateway.movie_detail(actor.as_ref(), id).await?))
}

pub async fn rate_movie(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<i32>,
    Json(req): Json<RatingPayload>,
) -> AppResult<Json<RatingOut>> {
    Ok(Json(state.gateway.rate_movie(Some(&actor), id, req.value).await?))
}

pub async fn toggle_favorite(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<i32>,
) -> AppResult<Json<Value>> {
    let toggled = state.gateway.toggle_favorite(Some(&actor), id).await?;
    let status = match toggled {
        FavoriteToggle::Added => "added",
        FavoriteToggle::Removed => "removed",
    };
    Ok(Json(json!({ "status": status })))
}

pub async fn write_review(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<i32>,
    Json(req): Json<ReviewPayload>,
) -> AppResult<Json<ReviewOut>> {
    Ok(Json(state.gateway.write_own_review(Some(&actor), id, &req.text).await?))
}

pub async fn edit_review(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<i32>,
    Json(req): Json<ReviewPayload>,
) -> AppResult<Json<ReviewOut>> {
    Ok(Json(state.gateway.edit_review(Some(&actor), id, &req.text).await?))
}

pub async fn delete_review(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<i32>,
) -> AppResult<Json<Value>> {
    state.gateway.delete_review(Some(&actor), id).await?;
    Ok(Json(json!({ "status": "deleted" })))
}

pub async fn moderation_dashboard(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Query(query): Query<ModerationQuery>,
) -> AppResult<Json<ModerationDashboard>> {
    Ok(Json(state.gateway.moderation_dashboard(Some(&actor), query).await?))
}

pub async fn toggle_user_status(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<i32>,
) -> AppResult<Json<UserOut>> {
    Ok(Json(state.gateway.toggle_user_status(Some(&actor), id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_removal_cookie_matches_login_scope() {
        let cookie = session_removal_cookie();
        assert_eq!(cookie.name(), SESSION_COOKIE);
        assert_eq!(cookie.path(), Some("/"));
    }
}
