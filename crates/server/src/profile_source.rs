use async_trait::async_trait;
use confguide_core::domain::profile::UserProfile;
use confguide_core::errors::ApplicationError;

/// Looks up an attendee profile from a public profile URL.
#[async_trait]
pub trait ProfileSource: Send + Sync {
    async fn fetch(&self, profile_url: &str) -> Result<UserProfile, ApplicationError>;
}

/// Used when no scraping backend is wired in; every lookup reports a configuration error.
#[derive(Clone, Copy, Debug, Default)]
pub struct UnconfiguredProfileSource;

#[async_trait]
impl ProfileSource for UnconfiguredProfileSource {
    async fn fetch(&self, _profile_url: &str) -> Result<UserProfile, ApplicationError> {
        Err(ApplicationError::Configuration("no profile source is configured".to_string()))
    }
}
