pub type ScriptlineResult<T> = Result<T, ScriptlineError>;

#[derive(thiserror::Error, Debug)]
pub enum ScriptlineError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("emission error: {0}")]
    Emission(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ScriptlineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn emission(msg: impl Into<String>) -> Self {
        Self::Emission(msg.into())
    }
}
