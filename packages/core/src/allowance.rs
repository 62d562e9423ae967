//! Approval handling and the allowance consistency wait.
//!
//! An approval and the transaction that spends it are separate chain
//! states, and the node serving reads can lag the one that accepted the
//! approval. Before spending, the allowance is re-read until it covers
//! the approved amount. The wait is bounded: reads back off
//! exponentially (with jitter), the caller can cancel it, and after
//! `max_attempts` reads it fails with `AllowanceTimeout`.

use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::chain::{ChainClient, TxReceipt};
use crate::error::{SettlementError, SettlementResult};
use crate::metrics::SettlementMetrics;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowancePoller {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
    pub jitter: Duration,
}

impl Default for AllowancePoller {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(8),
            max_attempts: 10,
            jitter: Duration::from_millis(250),
        }
    }
}

/// Outcome of `ensure_allowance`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Approval {
    AlreadyApproved(u128),
    Approved(TxReceipt),
}

impl AllowancePoller {
    /// Delay before read number `attempt + 1` (0-based), without jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.initial_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    fn backoff_with_jitter(&self, attempt: u32) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        let extra = if jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_ms)
        };
        self.backoff(attempt) + Duration::from_millis(extra)
    }

    /// Re-read the allowance until it reaches `required`.
    pub async fn wait_for_allowance(
        &self,
        chain: &dyn ChainClient,
        token: &str,
        owner: &str,
        spender: &str,
        required: u128,
        cancel: &CancellationToken,
        metrics: Option<&SettlementMetrics>,
    ) -> SettlementResult<u128> {
        let mut observed = 0;
        for attempt in 0..self.max_attempts {
            if cancel.is_cancelled() {
                return Err(SettlementError::Cancelled);
            }

            observed = chain.allowance(token, owner, spender).await?;
            if let Some(metrics) = metrics {
                metrics.allowance_polls_total.inc();
            }
            if observed >= required {
                tracing::debug!(
                    "Allowance {} >= {} observed after {} read(s)",
                    observed,
                    required,
                    attempt + 1
                );
                return Ok(observed);
            }

            if attempt + 1 == self.max_attempts {
                break;
            }
            let delay = self.backoff_with_jitter(attempt);
            tracing::debug!(
                "Allowance {} < {}, retrying in {:?} (read {}/{})",
                observed,
                required,
                delay,
                attempt + 1,
                self.max_attempts
            );

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => return Err(SettlementError::Cancelled),
            }
        }

        tracing::warn!(
            "Allowance for {} on {} still {} after {} reads",
            spender,
            token,
            observed,
            self.max_attempts
        );
        Err(SettlementError::AllowanceTimeout {
            attempts: self.max_attempts,
            observed,
            required,
        })
    }
}

/// Approve `spender` for `amount` unless the current allowance covers it.
pub async fn ensure_allowance(
    chain: &dyn ChainClient,
    token: &str,
    owner: &str,
    spender: &str,
    amount: u128,
) -> SettlementResult<Approval> {
    let current = chain.allowance(token, owner, spender).await?;
    if current >= amount {
        tracing::debug!("Allowance {} already covers {} on {}", current, amount, token);
        return Ok(Approval::AlreadyApproved(current));
    }

    tracing::info!("Approving {} units of {} for {}", amount, token, spender);
    let receipt = chain.approve(token, owner, spender, amount).await?;
    Ok(Approval::Approved(receipt))
}
