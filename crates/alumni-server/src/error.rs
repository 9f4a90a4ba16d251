use hyper::StatusCode;
use sea_orm::DbErr;
use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Message returned to clients for any 5xx that is not an upstream failure.
pub const INTERNAL_MESSAGE: &str = "Erreur interne du serveur";

/// A single field-level validation problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Issue {
    pub path: Vec<String>,
    pub message: String,
}

impl Issue {
    pub fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            path: vec![field.to_string()],
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Données invalides")]
    Validation(Vec<Issue>),
    #[error("{0}")]
    BadRequest(String),
    #[error("Non authentifié")]
    Unauthenticated,
    #[error("Email ou mot de passe incorrect")]
    InvalidCredentials,
    #[error("Accès refusé : Administrateur uniquement")]
    Forbidden,
    #[error("Compte désactivé")]
    Banned,
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("Cette demande a déjà été traitée")]
    AlreadyProcessed,
    #[error("{0}")]
    InvalidTransition(String),
    #[error("{0}")]
    Upstream(String),
    #[error("database error: {0}")]
    Database(#[from] DbErr),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Internal(String),
}

impl Error {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_)
            | Self::BadRequest(_)
            | Self::AlreadyProcessed
            | Self::InvalidTransition(_) => StatusCode::BAD_REQUEST,
            Self::Unauthenticated | Self::InvalidCredentials => StatusCode::UNAUTHORIZED,
            Self::Forbidden | Self::Banned => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Upstream(_)
            | Self::Database(_)
            | Self::Json(_)
            | Self::Io(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Errors whose details stay in the logs.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            Self::Database(_) | Self::Json(_) | Self::Io(_) | Self::Internal(_)
        )
    }

    pub fn public_message(&self) -> String {
        if self.is_internal() {
            INTERNAL_MESSAGE.to_string()
        } else {
            self.to_string()
        }
    }

    pub fn issues(&self) -> Option<&[Issue]> {
        match self {
            Self::Validation(issues) => Some(issues),
            _ => None,
        }
    }
}
