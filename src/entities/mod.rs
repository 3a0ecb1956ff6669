pub mod favorite_list;
pub mod favorite_list_movie;
pub mod genre;
pub mod group;
pub mod movie;
pub mod movie_genre;
pub mod movie_image;
pub mod rating;
pub mod review;
pub mod session;
pub mod user;
pub mod user_group;
