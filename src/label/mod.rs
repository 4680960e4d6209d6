//! Collision-free instance labels.
//!
//! Labels take the form `{prefix}_{NNN}`. Suffixes are tried in a random
//! order and each candidate is checked against a fresh listing of the
//! account, because parallel CI jobs share the label namespace and only the
//! live listing reflects what they have created.

use std::collections::HashSet;
use std::fmt;
use std::future::Future;

use thiserror::Error;

use crate::backoff::Entropy;

/// Maximum label length accepted by the provider.
pub const LABEL_MAX_LEN: usize = 64;

/// Number of distinct numeric suffixes (`000` to `999`).
pub const SUFFIX_SPACE: u16 = 1000;

const SUFFIX_LEN: usize = 4;

/// Errors raised while generating a label.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum LabelError<E>
where
    E: fmt::Debug + fmt::Display,
{
    /// Every candidate suffix already exists on the account.
    #[error(
        "unable to generate a unique label with prefix {prefix}; clean up stale instances on the account"
    )]
    Exhausted {
        /// Prefix that ran out of suffixes.
        prefix: String,
    },
    /// The live listing could not be fetched.
    #[error("failed to list existing instances: {0}")]
    Listing(E),
}

/// Produces candidate labels for one prefix.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LabelGenerator {
    prefix: String,
}

impl LabelGenerator {
    /// Creates a generator for labels of at most [`LABEL_MAX_LEN`] characters.
    #[must_use]
    pub fn new(prefix: &str) -> Self {
        Self::with_max_len(prefix, LABEL_MAX_LEN)
    }

    /// Creates a generator whose candidates never exceed `max_len`
    /// characters. The prefix is truncated so the suffix always fits.
    #[must_use]
    pub fn with_max_len(prefix: &str, max_len: usize) -> Self {
        let budget = max_len.saturating_sub(SUFFIX_LEN);
        Self {
            prefix: prefix.chars().take(budget).collect(),
        }
    }

    /// Prefix after truncation.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Renders the label for `suffix`.
    #[must_use]
    pub fn candidate(&self, suffix: u16) -> String {
        format!("{}_{suffix:03}", self.prefix)
    }

    /// Returns every candidate label in a random order.
    #[must_use]
    pub fn candidates(&self, entropy: &Entropy) -> Vec<String> {
        let mut suffixes: Vec<u16> = (0..SUFFIX_SPACE).collect();
        entropy.shuffle(&mut suffixes);
        suffixes
            .into_iter()
            .map(|suffix| self.candidate(suffix))
            .collect()
    }

    /// Returns the first candidate absent from the live listing.
    ///
    /// `list_existing` is called once per candidate so that labels created
    /// by concurrent runs since the previous check are seen.
    ///
    /// # Errors
    ///
    /// Returns [`LabelError::Exhausted`] when every suffix is taken and
    /// [`LabelError::Listing`] when the listing fails.
    pub async fn generate<F, Fut, E>(
        &self,
        entropy: &Entropy,
        mut list_existing: F,
    ) -> Result<String, LabelError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<HashSet<String>, E>>,
        E: fmt::Debug + fmt::Display,
    {
        for candidate in self.candidates(entropy) {
            let existing = list_existing().await.map_err(LabelError::Listing)?;
            if !existing.contains(&candidate) {
                return Ok(candidate);
            }
        }
        Err(LabelError::Exhausted {
            prefix: self.prefix.clone(),
        })
    }
}

/// Default prefix used when the operator does not configure one.
#[must_use]
pub fn default_prefix(job_name: &str, instance_name: &str) -> String {
    format!("kitchen-{job_name}-{instance_name}")
}

/// Replaces characters the provider rejects in labels.
#[must_use]
pub fn normalise_prefix(raw: &str) -> String {
    raw.trim().replace([' ', '/'], "_")
}
