use thiserror::Error;

#[derive(Debug, Error)]
pub enum HookError {
    /// A handler with the same name is already registered on the chain.
    #[error("Handler already registered: {name}")]
    DuplicateHandler { name: String },

    /// No handler with the given name is registered.
    #[error("Handler not found: {name}")]
    UnknownHandler { name: String },
}

pub type Result<T> = std::result::Result<T, HookError>;
