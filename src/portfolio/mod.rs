//! Portfolio reconciliation and the invitation-token lifecycle.
//!
//! An admin submits the full desired state of their portfolio in one payload;
//! [`ReconciliationEngine`] diffs it against persisted rows inside a single
//! transaction, allocating fresh access tokens for new renter invitations.
//! [`InvitationLifecycle`] governs the one transition an invitation undergoes
//! afterwards (redemption), and [`DashboardProjector`] answers status queries
//! off the same tables.

pub mod allocator;
pub mod dashboard;
pub mod domain;
pub mod lifecycle;
pub mod mailer;
pub mod memory;
pub mod reconcile;
pub mod repository;

#[cfg(test)]
mod tests;

pub use allocator::{AllocationError, OsTokenSampler, TokenAllocator, TokenSampler};
pub use dashboard::{
    ActiveRenterView, BuildingDashboard, DashboardError, DashboardProjector, InvitationView,
    SubmissionView,
};
pub use domain::{
    AccessToken, AdminId, BuildingDraft, BuildingId, BuildingRecord, CompanyId, CompanyRecord,
    CredentialHash, FieldIssue, InvitationId, InvitationRecord, InvitationStatus, PortfolioDraft,
    RenterEntry, RenterId, RenterRecord, UnitDraft, UnitId, UnitRecord, ValidationIssues,
};
pub use lifecycle::{
    CredentialHasher, InvitationLifecycle, InvitationPreview, PreviewError, RedeemError,
    Sha256CredentialHasher, WithdrawError,
};
pub use mailer::{InvitationEmail, InvitationMailer, LogMailer, MailerError};
pub use memory::{MemoryPortfolioStore, MemorySubmissionDirectory};
pub use reconcile::{ReconcileError, ReconciliationEngine};
pub use repository::{
    PortfolioStore, PortfolioTx, StoreError, SubmissionDirectory, SubmissionError, SubmissionMeta,
};
