use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{
    AccessToken, AdminId, BuildingId, BuildingRecord, CompanyId, CompanyRecord, InvitationId,
    InvitationRecord, RenterId, RenterRecord, UnitId, UnitRecord,
};

/// Row-level operations available inside one open transaction.
///
/// Deletes cascade to child rows the way relational foreign keys would:
/// removing a building removes its units and their invitations, removing a
/// unit removes its invitations. Renter rows are never part of any cascade.
pub trait PortfolioTx {
    fn company_by_admin(&mut self, admin: &AdminId) -> Result<Option<CompanyRecord>, StoreError>;
    fn company_by_id(&mut self, id: &CompanyId) -> Result<Option<CompanyRecord>, StoreError>;
    fn insert_company(&mut self, company: CompanyRecord) -> Result<(), StoreError>;
    fn update_company(&mut self, company: CompanyRecord) -> Result<(), StoreError>;

    fn buildings_for_company(
        &mut self,
        company: &CompanyId,
    ) -> Result<Vec<BuildingRecord>, StoreError>;
    fn building_by_id(&mut self, id: &BuildingId) -> Result<Option<BuildingRecord>, StoreError>;
    fn insert_building(&mut self, building: BuildingRecord) -> Result<(), StoreError>;
    fn update_building(&mut self, building: BuildingRecord) -> Result<(), StoreError>;
    fn delete_building(&mut self, id: &BuildingId) -> Result<(), StoreError>;

    fn units_for_building(&mut self, building: &BuildingId) -> Result<Vec<UnitRecord>, StoreError>;
    fn unit_by_id(&mut self, id: &UnitId) -> Result<Option<UnitRecord>, StoreError>;
    fn insert_unit(&mut self, unit: UnitRecord) -> Result<(), StoreError>;
    fn update_unit(&mut self, unit: UnitRecord) -> Result<(), StoreError>;
    fn delete_unit(&mut self, id: &UnitId) -> Result<(), StoreError>;

    fn invitations_for_unit(&mut self, unit: &UnitId)
        -> Result<Vec<InvitationRecord>, StoreError>;
    fn invitation_by_id(
        &mut self,
        id: &InvitationId,
    ) -> Result<Option<InvitationRecord>, StoreError>;
    /// Unique-index lookup backing both redemption and allocation collision
    /// checks.
    fn invitation_by_token(
        &mut self,
        token: &AccessToken,
    ) -> Result<Option<InvitationRecord>, StoreError>;
    fn insert_invitation(&mut self, invitation: InvitationRecord) -> Result<(), StoreError>;
    fn update_invitation(&mut self, invitation: InvitationRecord) -> Result<(), StoreError>;
    fn delete_invitation(&mut self, id: &InvitationId) -> Result<(), StoreError>;

    fn insert_renter(&mut self, renter: RenterRecord) -> Result<(), StoreError>;
    fn renters_for_company(
        &mut self,
        company: &CompanyId,
    ) -> Result<Vec<RenterRecord>, StoreError>;
}

/// Transactional storage seam. Every core operation runs its reads and writes
/// through exactly one `transaction` call: the closure either returns `Ok` and
/// the writes commit together, or returns `Err` and none of them are ever
/// observable. The backing engine's isolation is what keeps concurrent
/// reconciliations and redemptions from interleaving.
pub trait PortfolioStore: Send + Sync {
    fn transaction<T, E>(
        &self,
        work: impl FnOnce(&mut dyn PortfolioTx) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<StoreError>;
}

/// Error enumeration for storage failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("row already exists")]
    Conflict,
    #[error("row not found")]
    NotFound,
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Read-only access to the external inspection submission archive. Submission
/// rows are owned by another system; the core only projects their metadata
/// onto the dashboard.
pub trait SubmissionDirectory: Send + Sync {
    fn submissions_for_renter(
        &self,
        renter: &RenterId,
    ) -> Result<Vec<SubmissionMeta>, SubmissionError>;
}

/// Metadata describing one uploaded inspection report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionMeta {
    pub filename: String,
    pub size_bytes: u64,
    pub uploaded_at: DateTime<Utc>,
}

/// Submission archive lookup error.
#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    #[error("submission directory unavailable: {0}")]
    Unavailable(String),
}
