use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Review::Table)
                    .if_not_exists()
                    .col(pk_auto(Review::Id))
                    .col(integer(Review::MovieId))
                    .col(integer(Review::UserId))
                    .col(text(Review::Text))
                    .col(big_integer(Review::CreatedAt))
                    .col(big_integer_null(Review::UpdatedAt))
                    .col(integer_null(Review::UpdatedBy))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_review_movie")
                            .from(Review::Table, Review::MovieId)
                            .to(Movie::Table, Movie::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_review_user")
                            .from(Review::Table, Review::UserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_review_updated_by")
                            .from(Review::Table, Review::UpdatedBy)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        // No unique (user_id, movie_id) here: one review per pair is an
        // application convention, not a storage constraint.
        manager
            .create_index(
                Index::create()
                    .name("idx_review_user_movie")
                    .table(Review::Table)
                    .col(Review::UserId)
                    .col(Review::MovieId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Rating::Table)
                    .if_not_exists()
                    .col(pk_auto(Rating::Id))
                    .col(integer(Rating::MovieId))
                    .col(integer(Rating::UserId))
                    .col(integer(Rating::Value))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_rating_movie")
                            .from(Rating::Table, Rating::MovieId)
                            .to(Movie::Table, Movie::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_rating_user")
                            .from(Rating::Table, Rating::UserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_rating_user_movie_unique")
                    .table(Rating::Table)
                    .col(Rating::UserId)
                    .col(Rating::MovieId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(FavoriteList::Table)
                    .if_not_exists()
                    .col(pk_auto(FavoriteList::Id))
                    .col(integer(FavoriteList::UserId))
                    .col(string(FavoriteList::Name))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_favorite_list_user")
                            .from(FavoriteList::Table, FavoriteList::UserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_favorite_list_unique")
                    .table(FavoriteList::Table)
                    .col(FavoriteList::UserId)
                    .col(FavoriteList::Name)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(FavoriteListMovie::Table)
                    .if_not_exists()
                    .col(pk_auto(FavoriteListMovie::Id))
                    .col(integer(FavoriteListMovie::ListId))
                    .col(integer(FavoriteListMovie::MovieId))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_favorite_list_movie_list")
                            .from(FavoriteListMovie::Table, FavoriteListMovie::ListId)
                            .to(FavoriteList::Table, FavoriteList::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_favorite_list_movie_movie")
                            .from(FavoriteListMovie::Table, FavoriteListMovie::MovieId)
                            .to(Movie::Table, Movie::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_favorite_list_movie_unique")
                    .table(FavoriteListMovie::Table)
                    .col(FavoriteListMovie::ListId)
                    .col(FavoriteListMovie::MovieId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(FavoriteListMovie::Table).to_owned()).await?;
        manager.drop_table(Table::drop().table(FavoriteList::Table).to_owned()).await?;
        manager.drop_table(Table::drop().table(Rating::Table).to_owned()).await?;
        manager.drop_table(Table::drop().table(Review::Table).to_owned()).await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum Movie {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum User {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum Review {
    Table,
    Id,
    MovieId,
    UserId,
    Text,
    CreatedAt,
    UpdatedAt,
    UpdatedBy,
}

#[derive(DeriveIden)]
enum Rating {
    Table,
    Id,
    MovieId,
    UserId,
    Value,
}

#[derive(DeriveIden)]
enum FavoriteList {
    Table,
    Id,
    UserId,
    Name,
}

#[derive(DeriveIden)]
enum FavoriteListMovie {
    Table,
    Id,
    ListId,
    MovieId,
}
