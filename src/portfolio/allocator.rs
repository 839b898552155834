use rand::rngs::OsRng;
use rand::Rng;

use super::domain::AccessToken;
use super::repository::{PortfolioTx, StoreError};

/// Source of uniformly distributed raw token values in `0..AccessToken::SPACE`.
/// Tests script this seam to force collisions; production uses the OS RNG.
pub trait TokenSampler: Send + Sync {
    fn sample(&self) -> u32;
}

/// Operating-system RNG sampler.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsTokenSampler;

impl TokenSampler for OsTokenSampler {
    fn sample(&self) -> u32 {
        OsRng.gen_range(0..AccessToken::SPACE)
    }
}

/// Produces fixed-width numeric access tokens not currently assigned to any
/// invitation.
///
/// Allocation is only an existence check; the caller inserts the invitation
/// carrying the token inside the same transaction, which closes the check/use
/// race. Once an invitation row is deleted its token becomes eligible again.
pub struct TokenAllocator<S> {
    sampler: S,
    retry_budget: usize,
}

impl<S: TokenSampler> TokenAllocator<S> {
    /// Default retry bound. Exhausting it with a million-value token space is
    /// an operational anomaly, not something capacity planning should expect.
    pub const DEFAULT_RETRY_BUDGET: usize = 10;

    pub fn new(sampler: S) -> Self {
        Self::with_budget(sampler, Self::DEFAULT_RETRY_BUDGET)
    }

    pub fn with_budget(sampler: S, retry_budget: usize) -> Self {
        Self {
            sampler,
            retry_budget,
        }
    }

    /// Draw random tokens until one misses the invitation table, giving up
    /// after the retry budget.
    pub fn allocate(&self, tx: &mut dyn PortfolioTx) -> Result<AccessToken, AllocationError> {
        for _ in 0..self.retry_budget {
            let candidate = AccessToken::from_sample(self.sampler.sample());
            if tx.invitation_by_token(&candidate)?.is_none() {
                return Ok(candidate);
            }
        }

        Err(AllocationError::Exhausted {
            attempts: self.retry_budget,
        })
    }
}

/// Token allocation failure.
#[derive(Debug, thiserror::Error)]
pub enum AllocationError {
    /// Every draw within the retry budget collided with a live invitation.
    /// Retryable, but repeated exhaustion is a bug signal worth paging on.
    #[error("token allocation exhausted after {attempts} attempts")]
    Exhausted { attempts: usize },
    #[error(transparent)]
    Store(#[from] StoreError),
}
