use miette::Diagnostic;
use thiserror::Error;

use crate::access::errors::AccessError;

#[derive(Debug, Error, Diagnostic)]
pub enum PerimeterError {
    #[error("Database error: {0}")]
    #[diagnostic(code(perimeter::db))]
    Db(#[from] sea_orm::DbErr),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Access(#[from] AccessError),
}
