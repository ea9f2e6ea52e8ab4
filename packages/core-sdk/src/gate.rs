use std::fmt;

use crate::{error::GateError, llm::CompletionApi, session::Session, telemetry};

const KEY_PREFIX: &str = "sk-";
const MIN_KEY_BODY_LEN: usize = 20;

/**
 * \brief API key that passed the local format check.
 * \details Never printed: `Debug` is redacted and the secret is only reachable inside the crate.
 */
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /**
     * \brief Local syntax check: `sk-` followed by at least 20 ASCII alphanumerics, nothing else.
     */
    pub fn parse(candidate: &str) -> Result<Self, GateError> {
        if is_well_formed(candidate) {
            Ok(Self(candidate.to_string()))
        } else {
            Err(GateError::Format)
        }
    }

    pub(crate) fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(sk-***)")
    }
}

pub fn is_well_formed(candidate: &str) -> bool {
    candidate
        .strip_prefix(KEY_PREFIX)
        .map(|body| body.len() >= MIN_KEY_BODY_LEN && body.bytes().all(|b| b.is_ascii_alphanumeric()))
        .unwrap_or(false)
}

/**
 * \brief Run both gate steps and unlock the session on success.
 * \details Exactly one remote call is made when the format check passes, none otherwise. No retry.
 */
pub async fn validate<A>(api: &A, session: &mut Session, candidate: &str) -> Result<(), GateError>
where
    A: CompletionApi + ?Sized,
{
    let credential = match Credential::parse(candidate) {
        Ok(c) => c,
        Err(err) => {
            telemetry::log_error("gate", "rejected key: bad format");
            return Err(err);
        }
    };

    match api.list_models(&credential).await {
        Ok(models) => {
            telemetry::log_event("gate", &format!("key accepted, models={}", models.len()));
            session.unlock(credential);
            Ok(())
        }
        Err(e) => {
            telemetry::log_error("gate", &format!("key rejected by remote: {}", e));
            Err(GateError::Auth(e.to_string()))
        }
    }
}
