use cinelog::{
    auth,
    entities::{favorite_list, favorite_list_movie, movie, rating, review, session, user},
    error::AppError,
    gateway::ResourceGateway,
    models::{
        CatalogQuery, FavoriteToggle, ModerationQuery, ProfileQuery, RegisterRequest, SortField,
        SortOrder, UpdateUserRequest,
    },
    policy::{ADMINS_GROUP, Actor, MODERATORS_GROUP, USERS_GROUP},
};
use migration::{Migrator, MigratorTrait};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectOptions, ConnectionTrait, Database, EntityTrait,
    IntoActiveModel, QueryFilter, Set, Statement,
};

async fn test_gateway() -> ResourceGateway {
    let mut opts = ConnectOptions::new("sqlite::memory:".to_string());
    opts.max_connections(1).sqlx_logging(false);
    let db = Database::connect(opts).await.expect("connect");
    db.execute(Statement::from_string(
        db.get_database_backend(),
        "PRAGMA foreign_keys=ON".to_string(),
    ))
    .await
    .expect("pragma");
    Migrator::up(&db, None).await.expect("migrate");
    ResourceGateway::new(db)
}

async fn register(gw: &ResourceGateway, username: &str) -> Actor {
    let out = gw
        .register(
            None,
            RegisterRequest {
                username: username.to_string(),
                email: None,
                phone: None,
                password: "password123".to_string(),
            },
        )
        .await
        .expect("register");
    Actor {
        id: out.id,
        username: out.username,
        is_staff: false,
        is_superuser: false,
        groups: out.groups,
    }
}

fn staff() -> Actor {
    Actor {
        id: 9999,
        username: "admin".to_string(),
        is_staff: true,
        is_superuser: false,
        groups: Vec::new(),
    }
}

async fn promote_to_moderator(gw: &ResourceGateway, actor: &mut Actor) {
    let moderators = gw.ensure_group(MODERATORS_GROUP).await.expect("group");
    let users = gw.ensure_group(USERS_GROUP).await.expect("group");
    gw.update_user(
        Some(&staff()),
        actor.id,
        UpdateUserRequest { groups: Some(vec![users.id, moderators.id]), ..Default::default() },
    )
    .await
    .expect("promote");
    actor.groups.push(MODERATORS_GROUP.to_string());
}

async fn seed_movie(gw: &ResourceGateway, title: &str, release_date: &str) -> movie::Model {
    movie::ActiveModel {
        id: Default::default(),
        title: Set(title.to_string()),
        description: Set(format!("{title} description")),
        release_date: Set(release_date.to_string()),
        duration: Set(Some(120)),
        is_highlight: Set(false),
        image: Set(None),
    }
    .insert(gw.db())
    .await
    .expect("movie")
}

#[tokio::test]
async fn registration_joins_users_group() {
    let gw = test_gateway().await;
    let actor = register(&gw, "alice").await;
    assert!(actor.groups.iter().any(|g| g == USERS_GROUP));
    assert!(!actor.is_staff);

    let err = gw
        .register(
            None,
            RegisterRequest {
                username: "alice".to_string(),
                email: None,
                phone: None,
                password: "another".to_string(),
            },
        )
        .await
        .expect_err("duplicate username");
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn listing_users_requires_staff() {
    let gw = test_gateway().await;
    let alice = register(&gw, "alice").await;

    let err = gw.list_users(Some(&alice)).await.expect_err("plain user");
    assert!(matches!(err, AppError::Forbidden));
    let err = gw.list_users(None).await.expect_err("anonymous");
    assert!(matches!(err, AppError::Unauthenticated));

    let listed = gw.list_users(Some(&staff())).await.expect("staff");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].username, "alice");
}

#[tokio::test]
async fn own_record_updatable_but_not_deletable() {
    let gw = test_gateway().await;
    let alice = register(&gw, "alice").await;

    let updated = gw
        .update_user(
            Some(&alice),
            alice.id,
            UpdateUserRequest { email: Some("alice@example.com".to_string()), ..Default::default() },
        )
        .await
        .expect("self update");
    assert_eq!(updated.email.as_deref(), Some("alice@example.com"));

    let err = gw.delete_user(Some(&alice), alice.id).await.expect_err("self delete");
    assert!(matches!(err, AppError::Forbidden));

    // Role changes are not self-service.
    let err = gw
        .update_user(
            Some(&alice),
            alice.id,
            UpdateUserRequest { is_staff: Some(true), ..Default::default() },
        )
        .await
        .expect_err("self promote");
    assert!(matches!(err, AppError::Forbidden));
}

#[tokio::test]
async fn staff_delete_cascades_to_owned_records() {
    let gw = test_gateway().await;
    let alice = register(&gw, "alice").await;
    let film = seed_movie(&gw, "Stalker", "1979-05-25").await;

    gw.write_own_review(Some(&alice), film.id, "slow but worth it").await.expect("review");
    gw.rate_movie(Some(&alice), film.id, 5).await.expect("rating");
    gw.toggle_favorite(Some(&alice), film.id).await.expect("favorite");

    gw.delete_user(Some(&staff()), alice.id).await.expect("staff delete");

    let db = gw.db();
    assert!(user::Entity::find_by_id(alice.id).one(db).await.expect("q").is_none());
    let reviews = review::Entity::find()
        .filter(review::Column::UserId.eq(alice.id))
        .all(db)
        .await
        .expect("q");
    assert!(reviews.is_empty());
    let ratings = rating::Entity::find()
        .filter(rating::Column::UserId.eq(alice.id))
        .all(db)
        .await
        .expect("q");
    assert!(ratings.is_empty());
    let lists = favorite_list::Entity::find()
        .filter(favorite_list::Column::UserId.eq(alice.id))
        .all(db)
        .await
        .expect("q");
    assert!(lists.is_empty());
    assert!(favorite_list_movie::Entity::find().all(db).await.expect("q").is_empty());
}

#[tokio::test]
async fn rating_value_is_validated_and_upserted() {
    let gw = test_gateway().await;
    let alice = register(&gw, "alice").await;
    let film = seed_movie(&gw, "Solaris", "1972-03-20").await;

    for bad in [0, 6, -3] {
        let err = gw.rate_movie(Some(&alice), film.id, bad).await.expect_err("out of range");
        assert!(matches!(err, AppError::Validation(_)));
    }
    let none = rating::Entity::find().all(gw.db()).await.expect("q");
    assert!(none.is_empty(), "rejected ratings must not write");

    let first = gw.rate_movie(Some(&alice), film.id, 3).await.expect("rate");
    assert_eq!(first.value, 3);
    let second = gw.rate_movie(Some(&alice), film.id, 5).await.expect("re-rate");
    assert_eq!(second.value, 5);

    let rows = rating::Entity::find()
        .filter(rating::Column::UserId.eq(alice.id))
        .filter(rating::Column::MovieId.eq(film.id))
        .all(gw.db())
        .await
        .expect("q");
    assert_eq!(rows.len(), 1, "upsert must replace, not duplicate");
    assert_eq!(rows[0].value, 5);

    let err = gw.rate_movie(Some(&alice), film.id + 100, 4).await.expect_err("missing movie");
    assert!(matches!(err, AppError::NotFound));
}

#[tokio::test]
async fn favorite_toggle_round_trips() {
    let gw = test_gateway().await;
    let alice = register(&gw, "alice").await;
    let film = seed_movie(&gw, "Playtime", "1967-12-16").await;

    assert_eq!(
        gw.toggle_favorite(Some(&alice), film.id).await.expect("toggle"),
        FavoriteToggle::Added
    );
    assert_eq!(
        gw.toggle_favorite(Some(&alice), film.id).await.expect("toggle"),
        FavoriteToggle::Removed
    );

    // The list itself sticks around once lazily created; membership is gone.
    let lists = favorite_list::Entity::find()
        .filter(favorite_list::Column::UserId.eq(alice.id))
        .all(gw.db())
        .await
        .expect("q");
    assert_eq!(lists.len(), 1);
    assert!(favorite_list_movie::Entity::find().all(gw.db()).await.expect("q").is_empty());
}

#[tokio::test]
async fn one_review_per_movie_via_lookup() {
    let gw = test_gateway().await;
    let alice = register(&gw, "alice").await;
    let film = seed_movie(&gw, "Ran", "1985-06-01").await;

    let first = gw.write_own_review(Some(&alice), film.id, "first take").await.expect("write");
    assert!(first.updated_at.is_none());
    let second = gw.write_own_review(Some(&alice), film.id, "second take").await.expect("rewrite");
    assert_eq!(first.id, second.id);
    assert_eq!(second.text, "second take");

    let rows = review::Entity::find()
        .filter(review::Column::UserId.eq(alice.id))
        .all(gw.db())
        .await
        .expect("q");
    assert_eq!(rows.len(), 1);
}

#[tokio::test]
async fn moderator_edits_are_stamped_author_edits_are_not() {
    let gw = test_gateway().await;
    let alice = register(&gw, "alice").await;
    let mut mona = register(&gw, "mona").await;
    promote_to_moderator(&gw, &mut mona).await;
    let film = seed_movie(&gw, "M", "1931-05-11").await;

    let written = gw.write_own_review(Some(&alice), film.id, "a classic").await.expect("write");

    // Author edit: updated_at moves, updated_by stays unset.
    let self_edit =
        gw.edit_review(Some(&alice), written.id, "a timeless classic").await.expect("self edit");
    assert!(self_edit.updated_at.is_some());
    assert_eq!(self_edit.updated_by, None);

    // A different plain user may not touch it.
    let bob = register(&gw, "bob").await;
    let err = gw.edit_review(Some(&bob), written.id, "nope").await.expect_err("not the author");
    assert!(matches!(err, AppError::Forbidden));

    // Moderator edit: stamped.
    let mod_edit =
        gw.edit_review(Some(&mona), written.id, "tidied up").await.expect("moderator edit");
    assert_eq!(mod_edit.updated_by, Some(mona.id));
    assert!(mod_edit.updated_at.is_some());

    // Owner and moderator may both delete.
    gw.delete_review(Some(&alice), written.id).await.expect("owner delete");
}

#[tokio::test]
async fn group_listing_is_scoped_by_role() {
    let gw = test_gateway().await;
    let alice = register(&gw, "alice").await;
    gw.create_group(Some(&staff()), ADMINS_GROUP).await.expect("group");
    gw.create_group(Some(&staff()), MODERATORS_GROUP).await.expect("group");

    let all = gw.list_groups(Some(&staff())).await.expect("staff list");
    let names: Vec<&str> = all.iter().map(|g| g.name.as_str()).collect();
    assert!(names.contains(&"Users"));
    assert!(names.contains(&"Admins"));
    assert!(names.contains(&"Moderators"));

    let own = gw.list_groups(Some(&alice)).await.expect("member list");
    let names: Vec<&str> = own.iter().map(|g| g.name.as_str()).collect();
    assert_eq!(names, vec!["Users"]);

    let err = gw.create_group(Some(&alice), "Schemers").await.expect_err("non-staff create");
    assert!(matches!(err, AppError::Forbidden));

    // A group outside the caller's memberships reads as absent.
    let admins = all.iter().find(|g| g.name == "Admins").expect("admins");
    let err = gw.get_group(Some(&alice), admins.id).await.expect_err("out of scope");
    assert!(matches!(err, AppError::NotFound));
}

#[tokio::test]
async fn moderation_dashboard_scopes_visible_users() {
    let gw = test_gateway().await;
    let _alice = register(&gw, "alice").await;
    let mut mona = register(&gw, "mona").await;
    promote_to_moderator(&gw, &mut mona).await;
    let sue = register(&gw, "sue").await;
    gw.update_user(
        Some(&staff()),
        sue.id,
        UpdateUserRequest { is_superuser: Some(true), ..Default::default() },
    )
    .await
    .expect("promote superuser");

    let seen = gw
        .moderation_dashboard(Some(&mona), ModerationQuery::default())
        .await
        .expect("dashboard");
    let names: Vec<&str> = seen.users.items.iter().map(|u| u.username.as_str()).collect();
    assert_eq!(names, vec!["alice"], "moderator sees only plain users");

    let mut root = sue;
    root.is_superuser = true;
    let seen = gw
        .moderation_dashboard(Some(&root), ModerationQuery::default())
        .await
        .expect("dashboard");
    assert_eq!(seen.users.items.len(), 3, "superuser sees everyone");

    let plain = register(&gw, "pat").await;
    let err = gw
        .moderation_dashboard(Some(&plain), ModerationQuery::default())
        .await
        .expect_err("plain user");
    assert!(matches!(err, AppError::Forbidden));

    let toggled = gw.toggle_user_status(Some(&mona), plain.id).await.expect("toggle");
    assert!(!toggled.is_active);
}

#[tokio::test]
async fn profiles_are_self_or_moderator_only() {
    let gw = test_gateway().await;
    let alice = register(&gw, "alice").await;
    let bob = register(&gw, "bob").await;
    let film = seed_movie(&gw, "Brazil", "1985-02-20").await;
    gw.write_own_review(Some(&alice), film.id, "paperwork").await.expect("review");
    gw.rate_movie(Some(&alice), film.id, 4).await.expect("rating");
    gw.toggle_favorite(Some(&alice), film.id).await.expect("favorite");

    let own = gw.profile(Some(&alice), alice.id, ProfileQuery::default()).await.expect("own");
    assert_eq!(own.reviews.total, 1);
    assert_eq!(own.ratings.total, 1);
    assert_eq!(own.favorites.total, 1);

    let err = gw.profile(Some(&bob), alice.id, ProfileQuery::default()).await.expect_err("other");
    assert!(matches!(err, AppError::Forbidden));

    let mut mona = register(&gw, "mona").await;
    promote_to_moderator(&gw, &mut mona).await;
    let seen = gw.profile(Some(&mona), alice.id, ProfileQuery::default()).await.expect("mod");
    assert_eq!(seen.user.username, "alice");
}

#[tokio::test]
async fn catalog_filters_and_sorts_by_rating() {
    let gw = test_gateway().await;
    let alice = register(&gw, "alice").await;
    let rated = seed_movie(&gw, "Seven Samurai", "1954-04-26").await;
    let _unrated = seed_movie(&gw, "Ikiru", "1952-10-09").await;
    gw.rate_movie(Some(&alice), rated.id, 5).await.expect("rate");

    let page = gw
        .list_movies(CatalogQuery { rating_min: Some(4.0), ..Default::default() })
        .await
        .expect("filter");
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].title, "Seven Samurai");

    let page = gw
        .list_movies(CatalogQuery {
            sort: SortField::Rating,
            order: SortOrder::Desc,
            ..Default::default()
        })
        .await
        .expect("sort");
    assert_eq!(page.items[0].title, "Seven Samurai", "unrated sorts last on desc");
    assert_eq!(page.items[1].title, "Ikiru");

    let page = gw
        .list_movies(CatalogQuery { search: Some("ikiru".to_string()), ..Default::default() })
        .await
        .expect("search");
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].title, "Ikiru");
}

#[tokio::test]
async fn login_and_session_lifecycle() {
    let gw = test_gateway().await;
    let alice = register(&gw, "alice").await;
    let db = gw.db();

    let err = auth::login(db, "alice", "wrong", 1).await.expect_err("bad password");
    assert!(matches!(err, AppError::Unauthenticated));

    let (found, sess) = auth::login(db, "alice", "password123", 1).await.expect("login");
    assert_eq!(found.id, alice.id);
    let resolved = auth::resolve_actor(db, &sess.token).await.expect("resolve");
    assert_eq!(resolved.map(|a| a.id), Some(alice.id));

    // Expired sessions resolve to nothing and are removed.
    let mut am = session::Entity::find_by_id(sess.token.clone())
        .one(db)
        .await
        .expect("q")
        .expect("session")
        .into_active_model();
    am.expires_at = Set(0);
    am.update(db).await.expect("expire");
    let resolved = auth::resolve_actor(db, &sess.token).await.expect("resolve");
    assert!(resolved.is_none());
    assert!(session::Entity::find_by_id(sess.token.clone()).one(db).await.expect("q").is_none());

    // Deactivated accounts cannot log in.
    let mut mona = register(&gw, "mona").await;
    promote_to_moderator(&gw, &mut mona).await;
    gw.toggle_user_status(Some(&mona), alice.id).await.expect("deactivate");
    let err = auth::login(db, "alice", "password123", 1).await.expect_err("inactive");
    assert!(matches!(err, AppError::Unauthenticated));
}

#[tokio::test]
async fn group_membership_replacement_is_all_or_nothing() {
    let gw = test_gateway().await;
    let alice = register(&gw, "alice").await;
    let moderators = gw.ensure_group(MODERATORS_GROUP).await.expect("group");

    // A bad id anywhere in the list rejects the whole change up front.
    let err = gw
        .update_user(
            Some(&staff()),
            alice.id,
            UpdateUserRequest { groups: Some(vec![moderators.id, 9999]), ..Default::default() },
        )
        .await
        .expect_err("unknown group");
    assert!(matches!(err, AppError::Validation(_)));
    let kept = gw.get_user(Some(&staff()), alice.id).await.expect("user");
    assert_eq!(kept.groups, vec![USERS_GROUP.to_string()], "memberships untouched on failure");

    // A valid replacement lands as the full new set, nothing in between.
    let updated = gw
        .update_user(
            Some(&staff()),
            alice.id,
            UpdateUserRequest { groups: Some(vec![moderators.id]), ..Default::default() },
        )
        .await
        .expect("replace");
    assert_eq!(updated.groups, vec![MODERATORS_GROUP.to_string()]);
}

#[tokio::test]
async fn out_of_range_profile_pages_come_back_empty() {
    let gw = test_gateway().await;
    let alice = register(&gw, "alice").await;
    let film = seed_movie(&gw, "La Jetee", "1962-02-16").await;
    gw.write_own_review(Some(&alice), film.id, "still images").await.expect("review");

    let seen = gw
        .profile(
            Some(&alice),
            alice.id,
            ProfileQuery { review_page: Some(99), ..Default::default() },
        )
        .await
        .expect("profile");
    assert!(seen.reviews.items.is_empty());
    assert_eq!(seen.reviews.page, 99);
    assert_eq!(seen.reviews.total, 1);
    assert_eq!(seen.reviews.total_pages, 1);

    // An empty collection still reports one (empty) page.
    assert_eq!(seen.favorites.total, 0);
    assert_eq!(seen.favorites.total_pages, 1);
    assert!(seen.favorites.items.is_empty());
}
