//! Portfolio reconciliation and renter invitation lifecycle for rental
//! inspection management.
//!
//! Property managers submit the full desired state of their portfolio
//! (company → buildings → units → renters) and the [`portfolio`] module
//! reconciles it against persisted state, allocating collision-free one-time
//! access tokens for new renter invitations and governing their single
//! pending → used transition at redemption time.

pub mod config;
pub mod error;
pub mod portfolio;
pub mod telemetry;
