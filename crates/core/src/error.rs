use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Stack not found: {0}")]
    StackNotFound(String),

    #[error("Duplicate resource name: {0}")]
    DuplicateResource(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
