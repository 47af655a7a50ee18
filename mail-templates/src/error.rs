use thiserror::Error;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("unknown email scenario: {0}")]
    UnknownScenario(String),

    #[error("missing required template variables: {}", .keys.join(", "))]
    MissingVariables { keys: Vec<String> },

    #[error("variable '{key}' does not match its declared type ({expected})")]
    VariableType { key: String, expected: &'static str },

    #[error("template set for scenario '{scenario}' ({language}) is incomplete")]
    IncompleteTemplateSet { scenario: String, language: String },

    #[error("template registration failed: {0}")]
    Registration(String),

    #[error("template rendering failed: {0}")]
    Rendering(#[from] handlebars::RenderError),
}

pub type RenderResult<T> = Result<T, RenderError>;
