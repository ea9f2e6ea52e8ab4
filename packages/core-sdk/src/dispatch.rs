use std::time::Duration;

use serde::Serialize;

use crate::{
    error::BatchError,
    llm::CompletionApi,
    models::{Message, Model, ResultRecord},
    session::Session,
    telemetry,
};

/** \brief Upper bound on repetitions per batch, to stay inside API quotas. */
pub const MAX_REPETITIONS: u32 = 20;

const BASE_DELAY_MS: u64 = 1_000;
const DELAY_STEP_MS: u64 = 200;

/**
 * \brief Pause inserted after attempt `attempt` (0-based): `1 + attempt * 0.2` seconds.
 * \details Fixed linear schedule, not driven by any rate-limit feedback from the server.
 */
pub fn pacing_delay(attempt: u32) -> Duration {
    Duration::from_millis(BASE_DELAY_MS + DELAY_STEP_MS * u64::from(attempt))
}

/**
 * \brief Validated batch parameters. Construction is the caller-side check.
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRequest {
    prompt: String,
    model: Model,
    count: u32,
}

impl BatchRequest {
    /**
     * \brief Check the inputs a batch needs before it may start.
     * \details A prompt made only of whitespace counts as empty and is refused, like `""`.
     *          `count` must lie in `1..=MAX_REPETITIONS`.
     */
    pub fn new(prompt: impl Into<String>, model: Model, count: u32) -> Result<Self, BatchError> {
        let prompt = prompt.into();
        if prompt.trim().is_empty() {
            return Err(BatchError::EmptyPrompt);
        }
        if !(1..=MAX_REPETITIONS).contains(&count) {
            return Err(BatchError::CountOutOfRange {
                count,
                max: MAX_REPETITIONS,
            });
        }
        Ok(Self {
            prompt,
            model,
            count,
        })
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn model(&self) -> Model {
        self.model
    }

    pub fn count(&self) -> u32 {
        self.count
    }
}

/**
 * \brief Progress reported to the caller while a batch runs.
 */
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchEvent {
    /** \brief Attempt `completed` of `count` finished; `notice` holds the failure text if it failed. */
    Progress {
        completed: u32,
        count: u32,
        notice: Option<String>,
    },
    /** \brief Suspending before the next attempt. */
    Pausing { delay: Duration },
}

impl DispatchEvent {
    /** \brief Fraction done, in `[1/count, 1]`, for progress events. */
    pub fn fraction(&self) -> Option<f64> {
        match self {
            DispatchEvent::Progress {
                completed, count, ..
            } => Some(f64::from(*completed) / f64::from(*count)),
            DispatchEvent::Pausing { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub attempts: u32,
    pub failures: u32,
}

/**
 * \brief Send the prompt `request.count()` times, one attempt after another, appending one record per attempt.
 * \details A failed attempt is recorded as `"Error: ..."` and never stops the loop. The held API key is
 *          moved out of the session before the first attempt and dropped when the loop ends, so a later
 *          batch needs the key validated again.
 */
pub async fn run_batch<A, F>(
    session: &mut Session,
    api: &A,
    request: &BatchRequest,
    mut on_event: F,
) -> Result<BatchSummary, BatchError>
where
    A: CompletionApi + ?Sized,
    F: FnMut(DispatchEvent),
{
    if !session.is_unlocked() {
        return Err(BatchError::Locked);
    }
    let credential = session
        .take_credential()
        .ok_or(BatchError::CredentialExpired)?;

    let count = request.count();
    let model = request.model();
    let messages = [Message::user(request.prompt())];
    telemetry::log_event(
        "dispatch.batch",
        &format!(
            "start model={} count={} prompt_len={}",
            model,
            count,
            request.prompt().len()
        ),
    );

    let mut failures = 0;
    for i in 0..count {
        let (record, notice) = match api.complete(&credential, model, &messages).await {
            Ok(answer) => {
                telemetry::log_event(
                    "dispatch.attempt",
                    &format!("{}/{} ok answer_len={}", i + 1, count, answer.len()),
                );
                (ResultRecord::answered(request.prompt(), model, answer), None)
            }
            Err(err) => {
                failures += 1;
                telemetry::log_error(
                    "dispatch.attempt",
                    &format!("{}/{} failed: {}", i + 1, count, err),
                );
                (
                    ResultRecord::failed(request.prompt(), model, &err),
                    Some(err.to_string()),
                )
            }
        };
        session.results_mut().push(record);
        on_event(DispatchEvent::Progress {
            completed: i + 1,
            count,
            notice,
        });

        if i + 1 < count {
            let delay = pacing_delay(i);
            on_event(DispatchEvent::Pausing { delay });
            tokio::time::sleep(delay).await;
        }
    }
    drop(credential);

    telemetry::log_event(
        "dispatch.batch",
        &format!("done attempts={} failures={}", count, failures),
    );
    Ok(BatchSummary {
        attempts: count,
        failures,
    })
}
