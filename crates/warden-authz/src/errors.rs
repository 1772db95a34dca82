use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("invalid verb: {0}")]
    InvalidVerb(String),
    #[error("permission mask {0:#x} has undefined bits set")]
    InvalidMask(u32),
}

pub type AuthzResult<T> = Result<T, AuthzError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_variants() {
        let errors = vec![
            AuthzError::InvalidVerb("bad".to_string()),
            AuthzError::InvalidMask(1 << 20),
        ];

        for error in errors {
            let rendered = error.to_string();
            assert!(!rendered.is_empty());
        }
    }
}
