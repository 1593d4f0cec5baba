use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid slug `{slug}`: only ASCII letters, digits, `-` and `_` are allowed")]
    InvalidSlug { slug: String },
}
