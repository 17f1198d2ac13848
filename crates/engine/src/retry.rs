//! Bounded retry around the generation collaborator.

use std::time::Duration;

use autopilot_core::collaborators::Generator;
use autopilot_core::content::ContentContext;
use autopilot_core::generation::{GenerationError, GenerationResponse};

use crate::config::EngineConfig;

/// Attempt budget and pacing for one generation call.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub attempt_timeout: Duration,
    pub delay: Duration,
}

impl From<&EngineConfig> for RetryPolicy {
    fn from(config: &EngineConfig) -> Self {
        Self {
            max_attempts: config.generation_max_attempts.max(1),
            attempt_timeout: config.generation_timeout,
            delay: config.generation_retry_delay,
        }
    }
}

/// Final result of a generation call plus how many attempts it took.
#[derive(Debug)]
pub struct Generated {
    pub result: Result<GenerationResponse, GenerationError>,
    pub attempts: u32,
}

/// Call the generator, retrying transient failures (including per-attempt
/// timeouts) until the attempt budget runs out. Non-transient failures
/// return immediately.
pub async fn generate(
    generator: &dyn Generator,
    entity_id: &str,
    context: &ContentContext,
    policy: RetryPolicy,
) -> Generated {
    let mut attempts = 0;
    loop {
        attempts += 1;
        let result =
            match tokio::time::timeout(policy.attempt_timeout, generator.generate(entity_id, context))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(GenerationError::Timeout(policy.attempt_timeout.as_secs())),
            };

        match result {
            Err(e) if e.is_transient() && attempts < policy.max_attempts => {
                tracing::warn!(
                    entity_id,
                    attempt = attempts,
                    max_attempts = policy.max_attempts,
                    error = %e,
                    "Transient generation failure, retrying",
                );
                tokio::time::sleep(policy.delay).await;
            }
            result => return Generated { result, attempts },
        }
    }
}
