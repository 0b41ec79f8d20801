use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use parley_domain::email::is_plausible_address;
use parley_domain::registration::RegistrationState;
use parley_domain::site::Site;

use crate::domain::repository::{CodeGenerator, RegistrationStore};
use crate::domain::types::{MAX_HANDLE_LEN, Registration};
use crate::error::VerificationError;

pub struct CreateRegistrationInput {
    pub site: Site,
    pub handle: String,
    pub email: String,
}

/// Intake operation invoked by the registration endpoint: validates the
/// claim, binds a fresh verification code to it, and persists the `Pending`
/// record the matcher will pick up.
pub struct CreateRegistrationUseCase<S, G>
where
    S: RegistrationStore,
    G: CodeGenerator,
{
    pub store: S,
    pub codes: G,
    /// How long the matcher keeps polling before the registration expires.
    pub ttl: Duration,
}

impl<S, G> CreateRegistrationUseCase<S, G>
where
    S: RegistrationStore,
    G: CodeGenerator,
{
    pub async fn execute(
        &self,
        input: CreateRegistrationInput,
    ) -> Result<Registration, VerificationError> {
        let handle = input.handle.trim();
        if handle.is_empty()
            || handle.len() > MAX_HANDLE_LEN
            || handle.chars().any(char::is_whitespace)
        {
            return Err(VerificationError::InvalidHandle);
        }
        if !is_plausible_address(&input.email) {
            return Err(VerificationError::InvalidEmail);
        }

        let code = self
            .codes
            .generate()
            .map_err(|_| VerificationError::EntropyUnavailable)?;

        let now = Utc::now();
        let registration = Registration::new(
            input.site,
            handle.to_owned(),
            input.email,
            code,
            now,
            self.ttl,
        );
        self.store.create(&registration).await?;
        Ok(registration)
    }
}

/// Client-facing view of a registration, read by the status-polling endpoint.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RegistrationStatus {
    pub id: Uuid,
    pub site: Site,
    pub handle: String,
    pub state: RegistrationState,
    pub attempts: i32,
    pub expires_at: DateTime<Utc>,
    /// Human-readable reason, present for terminal failures only.
    pub reason: Option<&'static str>,
}

pub struct GetRegistrationUseCase<S: RegistrationStore> {
    pub store: S,
}

impl<S: RegistrationStore> GetRegistrationUseCase<S> {
    pub async fn execute(&self, id: Uuid) -> Result<RegistrationStatus, VerificationError> {
        let registration = self
            .store
            .find(id)
            .await?
            .ok_or(VerificationError::RegistrationNotFound)?;

        Ok(RegistrationStatus {
            id: registration.id,
            site: registration.site,
            handle: registration.handle,
            state: registration.state,
            attempts: registration.attempts,
            expires_at: registration.expires_at,
            reason: registration.state.failure_reason(),
        })
    }
}
