use std::{
    cmp::Ordering,
    collections::{HashMap, HashSet},
};

use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};

use crate::{
    auth::{group_names, hash_password, now_sec},
    entities::{
        favorite_list, favorite_list_movie, genre, group, movie, movie_genre, movie_image, rating,
        review, user, user_group,
    },
    error::{AppError, AppResult},
    models::{
        CatalogQuery, FavoriteToggle, GroupOut, HomePage, ModerationDashboard, ModerationQuery,
        MovieDetail, MovieSummary, Page, ProfileOut, ProfileQuery, RatingOut, RegisterRequest,
        ReviewOut, SortField, SortOrder, UpdateUserRequest, UserOut, summary_from_movie,
    },
    policy::{self, Action, Actor, MODERATORS_GROUP, USERS_GROUP},
};

const FAVORITES_LIST: &str = "Favorites";
const PROFILE_PAGE_SIZE: u64 = 5;
const MODERATION_PAGE_SIZE: u64 = 10;
const CATALOG_PAGE_SIZE: u64 = 20;
const HOME_HIGHLIGHT_LIMIT: u64 = 8;
const HOME_TOP_LIMIT: usize = 250;

/// Executes CRUD operations after the policy approves them, and scopes
/// list results to what the acting user may see.
#[derive(Clone)]
pub struct ResourceGateway {
    db: DatabaseConnection,
}

impl ResourceGateway {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    // ------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------

    /// Public registration. New accounts are plain users and join the
    /// "Users" group, which is created on first use.
    pub async fn register(
        &self,
        actor: Option<&Actor>,
        req: RegisterRequest,
    ) -> AppResult<UserOut> {
        policy::check(actor, Action::CreateUser)?;

        let username = req.username.trim().to_string();
        if username.is_empty() {
            return Err(AppError::validation("username is required"));
        }
        if req.password.is_empty() {
            return Err(AppError::validation("password is required"));
        }
        let exists = user::Entity::find()
            .filter(user::Column::Username.eq(username.as_str()))
            .one(&self.db)
            .await?;
        if exists.is_some() {
            return Err(AppError::validation("a user with this username already exists"));
        }
        let email = req.email.filter(|e| !e.trim().is_empty());
        if let Some(email) = &email {
            let taken = user::Entity::find()
                .filter(user::Column::Email.eq(email.as_str()))
                .one(&self.db)
                .await?;
            if taken.is_some() {
                return Err(AppError::validation("a user with this email already exists"));
            }
        }

        let created = user::ActiveModel {
            id: Default::default(),
            username: Set(username.clone()),
            email: Set(email),
            phone: Set(req.phone.filter(|p| !p.trim().is_empty())),
            password_hash: Set(hash_password(&req.password)?),
            is_staff: Set(false),
            is_superuser: Set(false),
            is_active: Set(true),
            date_joined: Set(now_sec()),
        }
        .insert(&self.db)
        .await?;

        let users_group = self.ensure_group(USERS_GROUP).await?;
        self.join_group(created.id, users_group.id).await?;

        tracing::info!(username, "user registered");
        self.user_out(created).await
    }

    pub async fn list_users(&self, actor: Option<&Actor>) -> AppResult<Vec<UserOut>> {
        policy::check(actor, Action::ListUsers)?;
        let users = user::Entity::find().order_by_asc(user::Column::Id).all(&self.db).await?;
        let groups = self.groups_by_user().await?;
        Ok(users
            .into_iter()
            .map(|u| {
                let names = groups.get(&u.id).cloned().unwrap_or_default();
                UserOut::from_model(u, names)
            })
            .collect())
    }

    pub async fn get_user(&self, actor: Option<&Actor>, id: i32) -> AppResult<UserOut> {
        policy::check(actor, Action::ReadUser { target: id })?;
        let found = user::Entity::find_by_id(id).one(&self.db).await?.ok_or(AppError::NotFound)?;
        self.user_out(found).await
    }

    /// Self-service update for profile fields and password; role flags and
    /// group membership only move for staff callers.
    pub async fn update_user(
        &self,
        actor: Option<&Actor>,
        id: i32,
        req: UpdateUserRequest,
    ) -> AppResult<UserOut> {
        policy::check(actor, Action::UpdateUser { target: id })?;
        let acting = actor.ok_or(AppError::Unauthenticated)?;

        let found = user::Entity::find_by_id(id).one(&self.db).await?.ok_or(AppError::NotFound)?;

        let wants_role_change = req.is_staff.is_some()
            || req.is_superuser.is_some()
            || req.is_active.is_some()
            || req.groups.is_some();
        if wants_role_change && !acting.is_staff {
            return Err(AppError::Forbidden);
        }

        if let Some(email) = &req.email {
            if !email.trim().is_empty() {
                let taken = user::Entity::find()
                    .filter(user::Column::Email.eq(email.as_str()))
                    .filter(user::Column::Id.ne(id))
                    .one(&self.db)
                    .await?;
                if taken.is_some() {
                    return Err(AppError::validation("a user with this email already exists"));
                }
            }
        }

        let mut am = found.into_active_model();
        if let Some(email) = req.email {
            am.email = Set(Some(email).filter(|e| !e.trim().is_empty()));
        }
        if let Some(phone) = req.phone {
            am.phone = Set(Some(phone).filter(|p| !p.trim().is_empty()));
        }
        if let Some(password) = req.password {
            if !password.is_empty() {
                am.password_hash = Set(hash_password(&password)?);
            }
        }
        if let Some(is_staff) = req.is_staff {
            am.is_staff = Set(is_staff);
        }
        if let Some(is_superuser) = req.is_superuser {
            am.is_superuser = Set(is_superuser);
        }
        if let Some(is_active) = req.is_active {
            am.is_active = Set(is_active);
        }
        let updated = am.update(&self.db).await?;

        if let Some(group_ids) = req.groups {
            let known = group::Entity::find()
                .filter(group::Column::Id.is_in(group_ids.clone()))
                .all(&self.db)
                .await?;
            if known.len() != group_ids.len() {
                return Err(AppError::validation("unknown group id"));
            }

            // Delete-then-reinsert must not be observable halfway: a
            // failure after the delete would strip the user's roles.
            let txn = self.db.begin().await?;
            user_group::Entity::delete_many()
                .filter(user_group::Column::UserId.eq(id))
                .exec(&txn)
                .await?;
            for group_id in group_ids {
                user_group::ActiveModel {
                    id: Default::default(),
                    user_id: Set(id),
                    group_id: Set(group_id),
                }
                .insert(&txn)
                .await?;
            }
            txn.commit().await?;
        }

        tracing::info!(user_id = id, by = %acting.username, "user updated");
        self.user_out(updated).await
    }

    /// Staff-only. Referential cascade removes the user's sessions, group
    /// memberships, reviews, ratings, and favorite lists with them.
    pub async fn delete_user(&self, actor: Option<&Actor>, id: i32) -> AppResult<()> {
        policy::check(actor, Action::DeleteUser)?;
        let found = user::Entity::find_by_id(id).one(&self.db).await?.ok_or(AppError::NotFound)?;
        let username = found.username.clone();
        user::Entity::delete_by_id(found.id).exec(&self.db).await?;
        tracing::info!(username, "user deleted");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Groups
    // ------------------------------------------------------------------

    /// Staff sees every group; everyone else only the groups they belong to.
    pub async fn list_groups(&self, actor: Option<&Actor>) -> AppResult<Vec<GroupOut>> {
        policy::check(actor, Action::ListGroups)?;
        let acting = actor.ok_or(AppError::Unauthenticated)?;
        let groups = if acting.is_staff {
            group::Entity::find().order_by_asc(group::Column::Id).all(&self.db).await?
        } else {
            let memberships = user_group::Entity::find()
                .filter(user_group::Column::UserId.eq(acting.id))
                .all(&self.db)
                .await?;
            let ids: Vec<i32> = memberships.iter().map(|m| m.group_id).collect();
            group::Entity::find()
                .filter(group::Column::Id.is_in(ids))
                .order_by_asc(group::Column::Id)
                .all(&self.db)
                .await?
        };
        Ok(groups.into_iter().map(GroupOut::from).collect())
    }

    pub async fn get_group(&self, actor: Option<&Actor>, id: i32) -> AppResult<GroupOut> {
        policy::check(actor, Action::ReadGroup)?;
        let acting = actor.ok_or(AppError::Unauthenticated)?;
        let found =
            group::Entity::find_by_id(id).one(&self.db).await?.ok_or(AppError::NotFound)?;
        if !acting.is_staff {
            let member = user_group::Entity::find()
                .filter(user_group::Column::UserId.eq(acting.id))
                .filter(user_group::Column::GroupId.eq(id))
                .one(&self.db)
                .await?;
            // Scoped like a filtered queryset: a group outside the
            // caller's memberships does not exist for them.
            if member.is_none() {
                return Err(AppError::NotFound);
            }
        }
        Ok(found.into())
    }

    pub async fn create_group(&self, actor: Option<&Actor>, name: &str) -> AppResult<GroupOut> {
        policy::check(actor, Action::MutateGroup)?;
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::validation("group name is required"));
        }
        let exists =
            group::Entity::find().filter(group::Column::Name.eq(name)).one(&self.db).await?;
        if exists.is_some() {
            return Err(AppError::validation("a group with this name already exists"));
        }
        let created = group::ActiveModel { id: Default::default(), name: Set(name.to_string()) }
            .insert(&self.db)
            .await?;
        tracing::info!(group = name, "group created");
        Ok(created.into())
    }

    pub async fn update_group(
        &self,
        actor: Option<&Actor>,
        id: i32,
        name: &str,
    ) -> AppResult<GroupOut> {
        policy::check(actor, Action::MutateGroup)?;
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::validation("group name is required"));
        }
        let found =
            group::Entity::find_by_id(id).one(&self.db).await?.ok_or(AppError::NotFound)?;
        let taken = group::Entity::find()
            .filter(group::Column::Name.eq(name))
            .filter(group::Column::Id.ne(id))
            .one(&self.db)
            .await?;
        if taken.is_some() {
            return Err(AppError::validation("a group with this name already exists"));
        }
        let mut am = found.into_active_model();
        am.name = Set(name.to_string());
        let updated = am.update(&self.db).await?;
        Ok(updated.into())
    }

    pub async fn delete_group(&self, actor: Option<&Actor>, id: i32) -> AppResult<()> {
        policy::check(actor, Action::MutateGroup)?;
        let found =
            group::Entity::find_by_id(id).one(&self.db).await?.ok_or(AppError::NotFound)?;
        group::Entity::delete_by_id(found.id).exec(&self.db).await?;
        tracing::info!(group = found.name, "group deleted");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Catalog
    // ------------------------------------------------------------------

    pub async fn home(&self) -> AppResult<HomePage> {
        let highlights = movie::Entity::find()
            .filter(movie::Column::IsHighlight.eq(true))
            .limit(HOME_HIGHLIGHT_LIMIT)
            .all(&self.db)
            .await?;
        let highlights = self.summaries(highlights).await?;

        let all = movie::Entity::find().all(&self.db).await?;
        let mut top_movies = self.summaries(all).await?;
        sort_by_rating(&mut top_movies, SortOrder::Desc);
        top_movies.truncate(HOME_TOP_LIMIT);

        Ok(HomePage { highlights, top_movies })
    }

    pub async fn list_movies(&self, query: CatalogQuery) -> AppResult<Page<MovieSummary>> {
        let movies = movie::Entity::find().all(&self.db).await?;
        let descriptions: HashMap<i32, String> =
            movies.iter().map(|m| (m.id, m.description.to_lowercase())).collect();
        let mut summaries = self.summaries(movies).await?;

        if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let needle = search.to_lowercase();
            summaries.retain(|m| {
                m.title.to_lowercase().contains(&needle)
                    || descriptions.get(&m.id).is_some_and(|d| d.contains(&needle))
                    || m.genres.iter().any(|g| g.to_lowercase().contains(&needle))
            });
        }

        if let Some(selected) = parse_genre_ids(query.genres.as_deref()) {
            let allowed = self.movie_ids_with_genres(&selected).await?;
            summaries.retain(|m| allowed.contains(&m.id));
        }

        if query.year_min.is_some() || query.year_max.is_some() {
            summaries.retain(|m| match release_year(&m.release_date) {
                Some(year) => {
                    query.year_min.is_none_or(|min| year >= min)
                        && query.year_max.is_none_or(|max| year <= max)
                }
                None => false,
            });
        }

        // A rating bound excludes unrated movies, matching a filter on an
        // aggregated column.
        if let Some(min) = query.rating_min {
            summaries.retain(|m| m.average_rating.is_some_and(|r| r >= min));
        }
        if let Some(max) = query.rating_max {
            summaries.retain(|m| m.average_rating.is_some_and(|r| r <= max));
        }

        match query.sort {
            SortField::Title => {
                summaries.sort_by(|a, b| a.title.cmp(&b.title));
                if query.order == SortOrder::Desc {
                    summaries.reverse();
                }
            }
            SortField::Year => {
                summaries.sort_by(|a, b| a.release_date.cmp(&b.release_date));
                if query.order == SortOrder::Desc {
                    summaries.reverse();
                }
            }
            SortField::Rating => sort_by_rating(&mut summaries, query.order),
        }

        let per_page = query.per_page.unwrap_or(CATALOG_PAGE_SIZE).clamp(1, 100);
        Ok(Page::paginate(summaries, query.page, per_page))
    }

    pub async fn movie_detail(&self, actor: Option<&Actor>, id: i32) -> AppResult<MovieDetail> {
        let found =
            movie::Entity::find_by_id(id).one(&self.db).await?.ok_or(AppError::NotFound)?;

        let genres = self.genres_for(&[id]).await?.remove(&id).unwrap_or_default();
        let extra_images = movie_image::Entity::find()
            .filter(movie_image::Column::MovieId.eq(id))
            .all(&self.db)
            .await?
            .into_iter()
            .map(|i| i.image)
            .collect();

        let ratings =
            rating::Entity::find().filter(rating::Column::MovieId.eq(id)).all(&self.db).await?;
        let average_rating = average(&ratings);

        let reviews = review::Entity::find()
            .filter(review::Column::MovieId.eq(id))
            .order_by_desc(review::Column::CreatedAt)
            .all(&self.db)
            .await?;
        let reviews = self.review_outs(reviews).await?;

        let (user_rating, is_favorite) = match actor {
            Some(acting) => {
                let own = ratings.iter().find(|r| r.user_id == acting.id).map(|r| r.value);
                let fav = self.is_favorite(acting.id, id).await?;
                (own, fav)
            }
            None => (None, false),
        };

        Ok(MovieDetail {
            id: found.id,
            title: found.title,
            description: found.description,
            release_date: found.release_date,
            duration: found.duration,
            is_highlight: found.is_highlight,
            image: found.image,
            extra_images,
            genres,
            average_rating,
            reviews,
            user_rating,
            is_favorite,
        })
    }

    // ------------------------------------------------------------------
    // Reviews
    // ------------------------------------------------------------------

    /// Create or update the caller's own review for a movie.
    ///
    /// One review per (user, movie) is enforced by this lookup, not by a
    /// storage constraint; two concurrent first submissions can still slip
    /// through as duplicates.
    pub async fn write_own_review(
        &self,
        actor: Option<&Actor>,
        movie_id: i32,
        text: &str,
    ) -> AppResult<ReviewOut> {
        policy::check(actor, Action::CreateReview)?;
        let acting = actor.ok_or(AppError::Unauthenticated)?;

        let text = text.trim();
        if text.is_empty() {
            return Err(AppError::validation("review text is required"));
        }
        movie::Entity::find_by_id(movie_id).one(&self.db).await?.ok_or(AppError::NotFound)?;

        let existing = review::Entity::find()
            .filter(review::Column::UserId.eq(acting.id))
            .filter(review::Column::MovieId.eq(movie_id))
            .one(&self.db)
            .await?;

        let saved = match existing {
            Some(own) => {
                // Self-edit: refresh updated_at, never stamp updated_by.
                let mut am = own.into_active_model();
                am.text = Set(text.to_string());
                am.updated_at = Set(Some(now_sec()));
                am.update(&self.db).await?
            }
            None => {
                review::ActiveModel {
                    id: Default::default(),
                    movie_id: Set(movie_id),
                    user_id: Set(acting.id),
                    text: Set(text.to_string()),
                    created_at: Set(now_sec()),
                    updated_at: Set(None),
                    updated_by: Set(None),
                }
                .insert(&self.db)
                .await?
            }
        };

        Ok(ReviewOut::from_model(saved, acting.username.clone()))
    }

    /// Edit any review by id. A moderator editing someone else's review is
    /// stamped into `updated_by`; authors editing their own never are.
    pub async fn edit_review(
        &self,
        actor: Option<&Actor>,
        review_id: i32,
        text: &str,
    ) -> AppResult<ReviewOut> {
        let found =
            review::Entity::find_by_id(review_id).one(&self.db).await?.ok_or(AppError::NotFound)?;
        policy::check(actor, Action::EditReview { author: found.user_id })?;
        let acting = actor.ok_or(AppError::Unauthenticated)?;

        let text = text.trim();
        if text.is_empty() {
            return Err(AppError::validation("review text is required"));
        }

        let author_id = found.user_id;
        let mut am = found.into_active_model();
        am.text = Set(text.to_string());
        am.updated_at = Set(Some(now_sec()));
        if acting.id != author_id {
            am.updated_by = Set(Some(acting.id));
            tracing::info!(review_id, moderator = %acting.username, "review edited by moderator");
        }
        let updated = am.update(&self.db).await?;

        let author = user::Entity::find_by_id(author_id).one(&self.db).await?;
        let username = author.map(|u| u.username).unwrap_or_default();
        Ok(ReviewOut::from_model(updated, username))
    }

    pub async fn delete_review(&self, actor: Option<&Actor>, review_id: i32) -> AppResult<()> {
        let found =
            review::Entity::find_by_id(review_id).one(&self.db).await?.ok_or(AppError::NotFound)?;
        policy::check(actor, Action::DeleteReview { author: found.user_id })?;
        review::Entity::delete_by_id(found.id).exec(&self.db).await?;
        tracing::info!(review_id, "review deleted");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Ratings
    // ------------------------------------------------------------------

    /// Upsert the caller's rating for a movie. The value is checked before
    /// any write; the write itself is a single ON CONFLICT statement keyed
    /// on (user, movie).
    pub async fn rate_movie(
        &self,
        actor: Option<&Actor>,
        movie_id: i32,
        value: i32,
    ) -> AppResult<RatingOut> {
        policy::check(actor, Action::RateMovie)?;
        let acting = actor.ok_or(AppError::Unauthenticated)?;

        if !(1..=5).contains(&value) {
            return Err(AppError::validation("rating must be between 1 and 5"));
        }
        movie::Entity::find_by_id(movie_id).one(&self.db).await?.ok_or(AppError::NotFound)?;

        rating::Entity::insert(rating::ActiveModel {
            id: Default::default(),
            movie_id: Set(movie_id),
            user_id: Set(acting.id),
            value: Set(value),
        })
        .on_conflict(
            sea_orm::sea_query::OnConflict::columns([
                rating::Column::UserId,
                rating::Column::MovieId,
            ])
            .update_columns([rating::Column::Value])
            .to_owned(),
        )
        .exec(&self.db)
        .await?;

        let saved = rating::Entity::find()
            .filter(rating::Column::UserId.eq(acting.id))
            .filter(rating::Column::MovieId.eq(movie_id))
            .one(&self.db)
            .await?
            .ok_or(AppError::NotFound)?;
        Ok(saved.into())
    }

    // ------------------------------------------------------------------
    // Favorites
    // ------------------------------------------------------------------

    /// Idempotent flip of a movie in the caller's "Favorites" list. The
    /// list itself is created on first use.
    pub async fn toggle_favorite(
        &self,
        actor: Option<&Actor>,
        movie_id: i32,
    ) -> AppResult<FavoriteToggle> {
        policy::check(actor, Action::ToggleFavorite)?;
        let acting = actor.ok_or(AppError::Unauthenticated)?;

        movie::Entity::find_by_id(movie_id).one(&self.db).await?.ok_or(AppError::NotFound)?;

        let list = self.ensure_favorites_list(acting.id).await?;
        let member = favorite_list_movie::Entity::find()
            .filter(favorite_list_movie::Column::ListId.eq(list.id))
            .filter(favorite_list_movie::Column::MovieId.eq(movie_id))
            .one(&self.db)
            .await?;

        match member {
            Some(row) => {
                favorite_list_movie::Entity::delete_by_id(row.id).exec(&self.db).await?;
                Ok(FavoriteToggle::Removed)
            }
            None => {
                favorite_list_movie::ActiveModel {
                    id: Default::default(),
                    list_id: Set(list.id),
                    movie_id: Set(movie_id),
                }
                .insert(&self.db)
                .await?;
                Ok(FavoriteToggle::Added)
            }
        }
    }

    // ------------------------------------------------------------------
    // Profiles & moderation
    // ------------------------------------------------------------------

    pub async fn profile(
        &self,
        actor: Option<&Actor>,
        user_id: i32,
        query: ProfileQuery,
    ) -> AppResult<ProfileOut> {
        policy::check(actor, Action::ReadProfile { target: user_id })?;
        let found =
            user::Entity::find_by_id(user_id).one(&self.db).await?.ok_or(AppError::NotFound)?;

        let reviews = review::Entity::find()
            .filter(review::Column::UserId.eq(user_id))
            .order_by_desc(review::Column::CreatedAt)
            .all(&self.db)
            .await?;
        let reviews: Vec<ReviewOut> = reviews
            .into_iter()
            .map(|r| ReviewOut::from_model(r, found.username.clone()))
            .collect();

        let ratings = rating::Entity::find()
            .filter(rating::Column::UserId.eq(user_id))
            .order_by_desc(rating::Column::Id)
            .all(&self.db)
            .await?;
        let ratings: Vec<RatingOut> = ratings.into_iter().map(RatingOut::from).collect();

        let favorites = self.favorite_movies(user_id).await?;
        let favorites = self.summaries(favorites).await?;

        let user = self.user_out(found).await?;
        Ok(ProfileOut {
            user,
            reviews: Page::paginate(reviews, query.review_page, PROFILE_PAGE_SIZE),
            ratings: Page::paginate(ratings, query.rating_page, PROFILE_PAGE_SIZE),
            favorites: Page::paginate(favorites, query.favorite_page, PROFILE_PAGE_SIZE),
        })
    }

    /// Superusers see everyone; moderators only see plain users, with
    /// superusers and fellow moderators excluded. Reviews follow the same
    /// visible-user scope.
    pub async fn moderation_dashboard(
        &self,
        actor: Option<&Actor>,
        query: ModerationQuery,
    ) -> AppResult<ModerationDashboard> {
        policy::check(actor, Action::Moderate)?;
        let acting = actor.ok_or(AppError::Unauthenticated)?;

        let mut users = user::Entity::find().order_by_asc(user::Column::Id).all(&self.db).await?;
        if !acting.is_superuser {
            let moderator_ids = self.members_of(MODERATORS_GROUP).await?;
            users.retain(|u| !u.is_superuser && !moderator_ids.contains(&u.id));
        }
        if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let needle = search.to_lowercase();
            users.retain(|u| {
                u.username.to_lowercase().contains(&needle)
                    || u.email.as_deref().is_some_and(|e| e.to_lowercase().contains(&needle))
            });
        }

        let visible_ids: HashSet<i32> = users.iter().map(|u| u.id).collect();
        let usernames: HashMap<i32, String> =
            users.iter().map(|u| (u.id, u.username.clone())).collect();

        let reviews = review::Entity::find()
            .filter(review::Column::UserId.is_in(visible_ids.iter().copied().collect::<Vec<_>>()))
            .order_by_desc(review::Column::CreatedAt)
            .all(&self.db)
            .await?;
        let reviews: Vec<ReviewOut> = reviews
            .into_iter()
            .map(|r| {
                let username = usernames.get(&r.user_id).cloned().unwrap_or_default();
                ReviewOut::from_model(r, username)
            })
            .collect();

        let groups = self.groups_by_user().await?;
        let users: Vec<UserOut> = users
            .into_iter()
            .map(|u| {
                let names = groups.get(&u.id).cloned().unwrap_or_default();
                UserOut::from_model(u, names)
            })
            .collect();

        Ok(ModerationDashboard {
            users: Page::paginate(users, query.user_page, MODERATION_PAGE_SIZE),
            reviews: Page::paginate(reviews, query.review_page, MODERATION_PAGE_SIZE),
        })
    }

    pub async fn toggle_user_status(&self, actor: Option<&Actor>, user_id: i32) -> AppResult<UserOut> {
        policy::check(actor, Action::Moderate)?;
        let found =
            user::Entity::find_by_id(user_id).one(&self.db).await?.ok_or(AppError::NotFound)?;
        let flipped = !found.is_active;
        let mut am = found.into_active_model();
        am.is_active = Set(flipped);
        let updated = am.update(&self.db).await?;
        tracing::info!(user_id, is_active = flipped, "user status toggled");
        self.user_out(updated).await
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    async fn user_out(&self, found: user::Model) -> AppResult<UserOut> {
        let groups = group_names(&self.db, found.id).await?;
        Ok(UserOut::from_model(found, groups))
    }

    pub async fn ensure_group(&self, name: &str) -> AppResult<group::Model> {
        if let Some(found) =
            group::Entity::find().filter(group::Column::Name.eq(name)).one(&self.db).await?
        {
            return Ok(found);
        }
        Ok(group::ActiveModel { id: Default::default(), name: Set(name.to_string()) }
            .insert(&self.db)
            .await?)
    }

    async fn join_group(&self, user_id: i32, group_id: i32) -> AppResult<()> {
        let exists = user_group::Entity::find()
            .filter(user_group::Column::UserId.eq(user_id))
            .filter(user_group::Column::GroupId.eq(group_id))
            .one(&self.db)
            .await?;
        if exists.is_none() {
            user_group::ActiveModel {
                id: Default::default(),
                user_id: Set(user_id),
                group_id: Set(group_id),
            }
            .insert(&self.db)
            .await?;
        }
        Ok(())
    }

    async fn members_of(&self, group_name: &str) -> AppResult<HashSet<i32>> {
        let Some(found) = group::Entity::find()
            .filter(group::Column::Name.eq(group_name))
            .one(&self.db)
            .await?
        else {
            return Ok(HashSet::new());
        };
        let memberships = user_group::Entity::find()
            .filter(user_group::Column::GroupId.eq(found.id))
            .all(&self.db)
            .await?;
        Ok(memberships.into_iter().map(|m| m.user_id).collect())
    }

    async fn groups_by_user(&self) -> AppResult<HashMap<i32, Vec<String>>> {
        let groups = group::Entity::find().all(&self.db).await?;
        let names: HashMap<i32, String> = groups.into_iter().map(|g| (g.id, g.name)).collect();
        let memberships = user_group::Entity::find().all(&self.db).await?;
        let mut out: HashMap<i32, Vec<String>> = HashMap::new();
        for m in memberships {
            if let Some(name) = names.get(&m.group_id) {
                out.entry(m.user_id).or_default().push(name.clone());
            }
        }
        Ok(out)
    }

    async fn ensure_favorites_list(&self, user_id: i32) -> AppResult<favorite_list::Model> {
        if let Some(found) = favorite_list::Entity::find()
            .filter(favorite_list::Column::UserId.eq(user_id))
            .filter(favorite_list::Column::Name.eq(FAVORITES_LIST))
            .one(&self.db)
            .await?
        {
            return Ok(found);
        }
        Ok(favorite_list::ActiveModel {
            id: Default::default(),
            user_id: Set(user_id),
            name: Set(FAVORITES_LIST.to_string()),
        }
        .insert(&self.db)
        .await?)
    }

    async fn is_favorite(&self, user_id: i32, movie_id: i32) -> AppResult<bool> {
        let Some(list) = favorite_list::Entity::find()
            .filter(favorite_list::Column::UserId.eq(user_id))
            .filter(favorite_list::Column::Name.eq(FAVORITES_LIST))
            .one(&self.db)
            .await?
        else {
            return Ok(false);
        };
        let member = favorite_list_movie::Entity::find()
            .filter(favorite_list_movie::Column::ListId.eq(list.id))
            .filter(favorite_list_movie::Column::MovieId.eq(movie_id))
            .one(&self.db)
            .await?;
        Ok(member.is_some())
    }

    async fn favorite_movies(&self, user_id: i32) -> AppResult<Vec<movie::Model>> {
        let Some(list) = favorite_list::Entity::find()
            .filter(favorite_list::Column::UserId.eq(user_id))
            .filter(favorite_list::Column::Name.eq(FAVORITES_LIST))
            .one(&self.db)
            .await?
        else {
            return Ok(Vec::new());
        };
        let members = favorite_list_movie::Entity::find()
            .filter(favorite_list_movie::Column::ListId.eq(list.id))
            .all(&self.db)
            .await?;
        let ids: Vec<i32> = members.iter().map(|m| m.movie_id).collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        Ok(movie::Entity::find().filter(movie::Column::Id.is_in(ids)).all(&self.db).await?)
    }

    async fn movie_ids_with_genres(&self, genre_ids: &[i32]) -> AppResult<HashSet<i32>> {
        let links = movie_genre::Entity::find()
            .filter(movie_genre::Column::GenreId.is_in(genre_ids.to_vec()))
            .all(&self.db)
            .await?;
        Ok(links.into_iter().map(|l| l.movie_id).collect())
    }

    async fn genres_for(&self, movie_ids: &[i32]) -> AppResult<HashMap<i32, Vec<String>>> {
        if movie_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let links = movie_genre::Entity::find()
            .filter(movie_genre::Column::MovieId.is_in(movie_ids.to_vec()))
            .all(&self.db)
            .await?;
        let genre_ids: Vec<i32> = links.iter().map(|l| l.genre_id).collect();
        let genres = if genre_ids.is_empty() {
            Vec::new()
        } else {
            genre::Entity::find().filter(genre::Column::Id.is_in(genre_ids)).all(&self.db).await?
        };
        let names: HashMap<i32, String> = genres.into_iter().map(|g| (g.id, g.name)).collect();
        let mut out: HashMap<i32, Vec<String>> = HashMap::new();
        for link in links {
            if let Some(name) = names.get(&link.genre_id) {
                out.entry(link.movie_id).or_default().push(name.clone());
            }
        }
        for list in out.values_mut() {
            list.sort();
        }
        Ok(out)
    }

    async fn summaries(&self, movies: Vec<movie::Model>) -> AppResult<Vec<MovieSummary>> {
        let ids: Vec<i32> = movies.iter().map(|m| m.id).collect();
        let mut genres = self.genres_for(&ids).await?;

        let ratings = rating::Entity::find().all(&self.db).await?;
        let mut sums: HashMap<i32, (i64, u64)> = HashMap::new();
        for r in &ratings {
            let entry = sums.entry(r.movie_id).or_insert((0, 0));
            entry.0 += i64::from(r.value);
            entry.1 += 1;
        }

        let reviews = review::Entity::find().all(&self.db).await?;
        let mut counts: HashMap<i32, u64> = HashMap::new();
        for r in &reviews {
            *counts.entry(r.movie_id).or_insert(0) += 1;
        }

        Ok(movies
            .into_iter()
            .map(|m| {
                let id = m.id;
                let avg = sums.get(&id).map(|(sum, n)| *sum as f64 / *n as f64);
                summary_from_movie(
                    m,
                    genres.remove(&id).unwrap_or_default(),
                    avg,
                    counts.get(&id).copied().unwrap_or(0),
                )
            })
            .collect())
    }

    async fn review_outs(&self, reviews: Vec<review::Model>) -> AppResult<Vec<ReviewOut>> {
        let user_ids: Vec<i32> = reviews.iter().map(|r| r.user_id).collect();
        let users = if user_ids.is_empty() {
            Vec::new()
        } else {
            user::Entity::find().filter(user::Column::Id.is_in(user_ids)).all(&self.db).await?
        };
        let names: HashMap<i32, String> = users.into_iter().map(|u| (u.id, u.username)).collect();
        Ok(reviews
            .into_iter()
            .map(|r| {
                let username = names.get(&r.user_id).cloned().unwrap_or_default();
                ReviewOut::from_model(r, username)
            })
            .collect())
    }
}

fn average(ratings: &[rating::Model]) -> Option<f64> {
    if ratings.is_empty() {
        return None;
    }
    let sum: i64 = ratings.iter().map(|r| i64::from(r.value)).sum();
    Some(sum as f64 / ratings.len() as f64)
}

fn release_year(release_date: &str) -> Option<i16> {
    release_date.get(..4).and_then(|y| y.parse().ok())
}

fn parse_genre_ids(raw: Option<&str>) -> Option<Vec<i32>> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }
    let ids: Vec<i32> = raw.split(',').filter_map(|part| part.trim().parse().ok()).collect();
    if ids.is_empty() { None } else { Some(ids) }
}

/// Rating sort with the unrated bucket at the far end: descending puts
/// unrated movies last, ascending puts them first.
fn sort_by_rating(summaries: &mut [MovieSummary], order: SortOrder) {
    summaries.sort_by(|a, b| {
        let cmp = match (a.average_rating, b.average_rating) {
            (Some(x), Some(y)) => match order {
                SortOrder::Asc => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
                SortOrder::Desc => y.partial_cmp(&x).unwrap_or(Ordering::Equal),
            },
            (Some(_), None) => match order {
                SortOrder::Asc => Ordering::Greater,
                SortOrder::Desc => Ordering::Less,
            },
            (None, Some(_)) => match order {
                SortOrder::Asc => Ordering::Less,
                SortOrder::Desc => Ordering::Greater,
            },
            (None, None) => Ordering::Equal,
        };
        cmp.then_with(|| a.title.cmp(&b.title))
    });
}
