use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum ConsentError {
    #[error("Not found: {0}")]
    #[diagnostic(code(covenant::not_found))]
    NotFound(String),

    #[error("Consent {0} is already in terminal status {1}")]
    #[diagnostic(code(covenant::already_terminal))]
    AlreadyTerminal(String, String),

    #[error("Validation error: {0}")]
    #[diagnostic(code(covenant::validation))]
    Validation(String),

    #[error("Search error: {0}")]
    #[diagnostic(code(covenant::search))]
    Search(String),

    #[error("Config error: {0}")]
    #[diagnostic(code(covenant::config))]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    #[diagnostic(code(covenant::serde))]
    Serde(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    #[diagnostic(code(covenant::db))]
    Db(#[from] sea_orm::DbErr),

    #[error("{0}")]
    #[diagnostic(code(covenant::other))]
    Other(String),
}
