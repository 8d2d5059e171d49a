mod database {
    pub mod actions;
    pub mod error;
    pub mod form;
    pub mod pagination;
    pub mod schema;
    pub mod views;
}
mod authentication {
    pub mod cryptography;
    pub mod jwt;
    pub mod middleware;
    pub mod permissions;
}
mod constants;

mod cache {
    pub mod cache;
}

pub mod config;
pub mod media;
pub mod report;
pub mod routes;
pub mod state;

pub use authentication::*;
pub use cache::cache::*;
pub use constants::*;
pub use database::*;
