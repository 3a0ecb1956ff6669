use serde::{Deserialize, Serialize};

use crate::entities::{group, movie, rating, review, user};

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Partial user update. Role flags and group membership only take effect
/// for staff callers; everyone else gets Forbidden if they try.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateUserRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub is_staff: Option<bool>,
    #[serde(default)]
    pub is_superuser: Option<bool>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub groups: Option<Vec<i32>>,
}

#[derive(Debug, Deserialize)]
pub struct GroupPayload {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct ReviewPayload {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct RatingPayload {
    pub value: i32,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SortField {
    #[default]
    Title,
    Year,
    Rating,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Default, Deserialize)]
pub struct CatalogQuery {
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub sort: SortField,
    #[serde(default)]
    pub order: SortOrder,
    #[serde(default)]
    pub rating_min: Option<f64>,
    #[serde(default)]
    pub rating_max: Option<f64>,
    #[serde(default)]
    pub year_min: Option<i16>,
    #[serde(default)]
    pub year_max: Option<i16>,
    /// Comma-separated genre ids, e.g. `genres=1,4`.
    #[serde(default)]
    pub genres: Option<String>,
    #[serde(default)]
    pub page: Option<u64>,
    #[serde(default)]
    pub per_page: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProfileQuery {
    #[serde(default)]
    pub review_page: Option<u64>,
    #[serde(default)]
    pub rating_page: Option<u64>,
    #[serde(default)]
    pub favorite_page: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ModerationQuery {
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub user_page: Option<u64>,
    #[serde(default)]
    pub review_page: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u64,
    pub per_page: u64,
    pub total: u64,
    pub total_pages: u64,
}

impl<T> Page<T> {
    /// In-memory pagination over an already filtered/sorted result set.
    /// Pages are 1-based; out-of-range pages come back empty.
    pub fn paginate(all: Vec<T>, page: Option<u64>, per_page: u64) -> Self {
        let page = page.unwrap_or(1).max(1);
        let total = all.len() as u64;
        let total_pages = total.div_ceil(per_page).max(1);
        let start = (page - 1).saturating_mul(per_page) as usize;
        let items = all.into_iter().skip(start).take(per_page as usize).collect();
        Self { items, page, per_page, total, total_pages }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct UserOut {
    pub id: i32,
    pub username: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub is_active: bool,
    pub date_joined: i64,
    pub groups: Vec<String>,
}

impl UserOut {
    pub fn from_model(user: user::Model, groups: Vec<String>) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            phone: user.phone,
            is_staff: user.is_staff,
            is_superuser: user.is_superuser,
            is_active: user.is_active,
            date_joined: user.date_joined,
            groups,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct GroupOut {
    pub id: i32,
    pub name: String,
}

impl From<group::Model> for GroupOut {
    fn from(g: group::Model) -> Self {
        Self { id: g.id, name: g.name }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct MovieSummary {
    pub id: i32,
    pub title: String,
    pub release_date: String,
    pub duration: Option<i32>,
    pub is_highlight: bool,
    pub image: Option<String>,
    pub genres: Vec<String>,
    pub average_rating: Option<f64>,
    pub review_count: u64,
}

#[derive(Debug, Serialize)]
pub struct MovieDetail {
    pub id: i32,
    pub title: String,
    pub description: String,
    pub release_date: String,
    pub duration: Option<i32>,
    pub is_highlight: bool,
    pub image: Option<String>,
    pub extra_images: Vec<String>,
    pub genres: Vec<String>,
    pub average_rating: Option<f64>,
    pub reviews: Vec<ReviewOut>,
    /// Present only for an authenticated caller.
    pub user_rating: Option<i32>,
    pub is_favorite: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct ReviewOut {
    pub id: i32,
    pub movie_id: i32,
    pub user_id: i32,
    pub username: String,
    pub text: String,
    pub created_at: i64,
    pub updated_at: Option<i64>,
    pub updated_by: Option<i32>,
}

impl ReviewOut {
    pub fn from_model(r: review::Model, username: String) -> Self {
        Self {
            id: r.id,
            movie_id: r.movie_id,
            user_id: r.user_id,
            username,
            text: r.text,
            created_at: r.created_at,
            updated_at: r.updated_at,
            updated_by: r.updated_by,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct RatingOut {
    pub id: i32,
    pub movie_id: i32,
    pub value: i32,
}

impl From<rating::Model> for RatingOut {
    fn from(r: rating::Model) -> Self {
        Self { id: r.id, movie_id: r.movie_id, value: r.value }
    }
}

#[derive(Debug, Serialize)]
pub struct HomePage {
    pub highlights: Vec<MovieSummary>,
    pub top_movies: Vec<MovieSummary>,
}

#[derive(Debug, Serialize)]
pub struct ProfileOut {
    pub user: UserOut,
    pub reviews: Page<ReviewOut>,
    pub ratings: Page<RatingOut>,
    pub favorites: Page<MovieSummary>,
}

#[derive(Debug, Serialize)]
pub struct ModerationDashboard {
    pub users: Page<UserOut>,
    pub reviews: Page<ReviewOut>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FavoriteToggle {
    Added,
    Removed,
}

pub fn summary_from_movie(
    m: movie::Model,
    genres: Vec<String>,
    average_rating: Option<f64>,
    review_count: u64,
) -> MovieSummary {
    MovieSummary {
        id: m.id,
        title: m.title,
        release_date: m.release_date,
        duration: m.duration,
        is_highlight: m.is_highlight,
        image: m.image,
        genres,
        average_rating,
        review_count,
    }
}
