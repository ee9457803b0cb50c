use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("javascript error: {0}")]
    Js(#[from] rquickjs::Error),

    #[error("failed to read script: {0}")]
    Io(#[from] std::io::Error),
}
