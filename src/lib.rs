pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod error;
pub mod gateway;
pub mod models;
pub mod policy;
pub mod routes;

use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::{config::Config, gateway::ResourceGateway};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: DatabaseConnection,
    pub gateway: ResourceGateway,
}
