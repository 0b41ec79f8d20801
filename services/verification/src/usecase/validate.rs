use parley_domain::site::Site;

use crate::domain::repository::ProfileFetcher;
use crate::error::{FetchError, VerificationError};

/// Pre-registration check invoked by the UI before a code is issued: does
/// the claimed handle exist on the site at all?
///
/// Performs a single profile read. Transient site failures propagate so the
/// caller can tell "no such account" from "could not check right now".
pub struct ValidateHandleUseCase<F: ProfileFetcher> {
    pub fetcher: F,
}

impl<F: ProfileFetcher> ValidateHandleUseCase<F> {
    pub async fn execute(&self, site: Site, handle: &str) -> Result<bool, VerificationError> {
        match self.fetcher.fetch(site, handle).await {
            Ok(_) => Ok(true),
            Err(FetchError::NotFound) => Ok(false),
            Err(error) => Err(anyhow::Error::new(error)
                .context("validate handle")
                .into()),
        }
    }
}
