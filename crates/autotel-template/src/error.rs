use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("template '{template}' references variable '{variable}' with no value and no default")]
    MissingVariable { template: String, variable: String },

    #[error("template '{template}' has an unterminated placeholder")]
    UnterminatedPlaceholder { template: String },
}
