//! REST backend for the alumni directory.
//!
//! Profiles, the accounts linked to them, profile update requests and the
//! reporting built on top, served over HTTP/1 by [`server::serve`].

use std::sync::Arc;

use sea_orm::DatabaseConnection;

pub mod config;
pub mod crypto;
pub mod db;
pub mod env;
pub mod error;
pub mod export;
pub mod handlers;
pub mod http;
pub mod identity;
pub mod lifecycle;
pub mod reporting;
pub mod router;
pub mod scraper;
pub mod server;
pub mod util;
pub mod validation;

pub use config::Config;
pub use error::{Error, Result};

use identity::{DbSessionResolver, SessionResolver};
use scraper::{ApifyScraper, ProfileScraper};

/// Shared state handed to every request.
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub config: Arc<Config>,
    pub sessions: Arc<dyn SessionResolver>,
    pub scraper: Arc<dyn ProfileScraper>,
}

impl AppState {
    /// State backed by database sessions and the Apify scraper.
    pub fn new(db: DatabaseConnection, config: Config) -> Result<Self> {
        let scraper = ApifyScraper::new(config.apify_token.clone())?;
        Ok(Self {
            sessions: Arc::new(DbSessionResolver::new(db.clone())),
            scraper: Arc::new(scraper),
            config: Arc::new(config),
            db,
        })
    }

    pub fn with_scraper(mut self, scraper: Arc<dyn ProfileScraper>) -> Self {
        self.scraper = scraper;
        self
    }
}
