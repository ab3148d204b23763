//! Group slug rules: derivation from a title and the allowed charset.

use std::future::Future;

use slug::slugify;
use thiserror::Error;

pub const MAX_SLUG_CHARS: usize = 50;
const MAX_SUFFIX_ATTEMPTS: usize = 32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SlugError {
    #[error("slug source text is empty")]
    EmptyInput,
    #[error("failed to derive slug from `{input}`")]
    Unrepresentable { input: String },
    #[error(
        "Enter a valid \"slug\" consisting of letters, numbers, underscores or hyphens."
    )]
    InvalidCharacters,
    #[error("Ensure this value has at most 50 characters (it has {len}).")]
    TooLong { len: usize },
    #[error("exhausted attempts to find a unique slug for `{base}`")]
    Exhausted { base: String },
}

#[derive(Debug, Error)]
pub enum SlugAsyncError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    #[error(transparent)]
    Slug(#[from] SlugError),
    #[error(transparent)]
    Predicate(E),
}

/// Check that `slug` only uses `[-a-zA-Z0-9_]` and fits the column.
pub fn validate_slug(slug: &str) -> Result<(), SlugError> {
    if slug.is_empty() {
        return Err(SlugError::EmptyInput);
    }
    let len = slug.chars().count();
    if len > MAX_SLUG_CHARS {
        return Err(SlugError::TooLong { len });
    }
    if !slug
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
    {
        return Err(SlugError::InvalidCharacters);
    }
    Ok(())
}

/// Derive a base slug from a group title.
pub fn derive_slug(input: &str) -> Result<String, SlugError> {
    if input.trim().is_empty() {
        return Err(SlugError::EmptyInput);
    }

    let mut candidate = slugify(input);
    if candidate.is_empty() {
        return Err(SlugError::Unrepresentable {
            input: input.to_string(),
        });
    }

    // slugify output is ASCII, so byte truncation is safe.
    if candidate.len() > MAX_SLUG_CHARS {
        candidate.truncate(MAX_SLUG_CHARS);
        while candidate.ends_with('-') {
            candidate.pop();
        }
    }

    Ok(candidate)
}

/// Derive a slug from `input`, suffixing `-2`, `-3`, … until `is_unique` accepts it.
pub async fn generate_unique_slug<F, Fut, E>(
    input: &str,
    mut is_unique: F,
) -> Result<String, SlugAsyncError<E>>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<bool, E>>,
    E: std::error::Error + Send + Sync + 'static,
{
    let base = derive_slug(input)?;

    if is_unique(base.clone())
        .await
        .map_err(SlugAsyncError::Predicate)?
    {
        return Ok(base);
    }

    for attempt in 2..=MAX_SUFFIX_ATTEMPTS + 1 {
        let suffix = format!("-{attempt}");
        let mut stem = base.clone();
        stem.truncate(MAX_SLUG_CHARS - suffix.len());
        let candidate = format!("{stem}{suffix}");
        if is_unique(candidate.clone())
            .await
            .map_err(SlugAsyncError::Predicate)?
        {
            return Ok(candidate);
        }
    }

    Err(SlugAsyncError::Slug(SlugError::Exhausted { base }))
}
