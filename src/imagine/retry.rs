// src/imagine/retry.rs

use crate::error::{AppError, Result};
use crate::imagine::media::GeneratedImages;
use crate::pool::CredentialPool;
use std::future::Future;
use tracing::{info, warn};

/// Retry budgets for one logical generate call.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    /// Stricter sub-budget for blocked attempts.
    pub max_blocked_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            max_blocked_retries: 3,
        }
    }
}

/// Drives up to `max_retries` attempts across the credential pool.
///
/// A pinned credential bypasses pool selection and disables rotation: any
/// failure returns immediately. Rotation happens only for the failure
/// classes a different credential may fix (rate-limited, unauthorized) and,
/// under its own budget, for blocked attempts. Everything else surfaces as
/// is.
pub async fn run_with_rotation<F, Fut>(
    pool: &CredentialPool,
    policy: &RetryPolicy,
    pinned: Option<&str>,
    mut attempt: F,
) -> Result<GeneratedImages>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<GeneratedImages>>,
{
    let mut last_error: Option<AppError> = None;
    let mut blocked_retries = 0u32;

    for attempt_no in 1..=policy.max_retries {
        let credential = match pinned {
            Some(secret) => secret.to_string(),
            None => match pool.next_credential().await? {
                Some(secret) => secret,
                None => return Err(AppError::NoCredentialsAvailable),
            },
        };

        match attempt(credential.clone()).await {
            Ok(images) => {
                pool.mark_success(&credential).await?;
                pool.record_usage(&credential).await?;
                return Ok(images);
            }
            Err(error @ AppError::Blocked(_)) => {
                blocked_retries += 1;
                warn!(
                    attempt = attempt_no,
                    blocked_retries,
                    max_blocked = policy.max_blocked_retries,
                    "generation blocked"
                );
                pool.mark_failed(&credential, "blocked: no final image produced")
                    .await?;
                if blocked_retries >= policy.max_blocked_retries || pinned.is_some() {
                    return Err(error);
                }
            }
            Err(error) if error.is_rotation_recoverable() => {
                pool.mark_failed(&credential, error.error_code()).await?;
                if pinned.is_some() {
                    return Err(error);
                }
                info!(
                    attempt = attempt_no,
                    max = policy.max_retries,
                    code = error.error_code(),
                    "attempt failed; rotating credential"
                );
                last_error = Some(error);
            }
            // Connection-level and unclassified failures say nothing about
            // the credential; rotation will not help.
            Err(error) => return Err(error),
        }
    }

    Err(last_error.unwrap_or(AppError::RetriesExhausted))
}
