use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::domain::{
    AccessToken, AdminId, BuildingId, InvitationId, InvitationRecord, InvitationStatus, RenterId,
    RenterRecord, UnitRecord,
};
use super::repository::{
    PortfolioStore, StoreError, SubmissionDirectory, SubmissionError, SubmissionMeta,
};

/// Read-only projection of an admin's portfolio for display: per building,
/// invitations partitioned into pending and used, plus the active renters
/// whose denormalized building name matches, each with their latest
/// submission. No caching; every call reads committed state directly.
pub struct DashboardProjector<S, D> {
    store: Arc<S>,
    submissions: Arc<D>,
}

impl<S, D> DashboardProjector<S, D>
where
    S: PortfolioStore,
    D: SubmissionDirectory,
{
    pub fn new(store: Arc<S>, submissions: Arc<D>) -> Self {
        Self { store, submissions }
    }

    /// Build the per-building dashboard for an admin. An admin who has not
    /// saved a portfolio yet gets an empty vector, not an error.
    pub fn dashboard(&self, admin: &AdminId) -> Result<Vec<BuildingDashboard>, DashboardError> {
        let snapshot = self.store.transaction(|tx| {
            let Some(company) = tx.company_by_admin(admin)? else {
                return Ok::<_, DashboardError>(None);
            };

            let mut buildings = Vec::new();
            for building in tx.buildings_for_company(&company.id)? {
                let mut units = Vec::new();
                for unit in tx.units_for_building(&building.id)? {
                    let invitations = tx.invitations_for_unit(&unit.id)?;
                    units.push((unit, invitations));
                }
                buildings.push((building, units));
            }

            let renters = tx.renters_for_company(&company.id)?;
            Ok(Some((buildings, renters)))
        })?;

        let Some((buildings, renters)) = snapshot else {
            return Ok(Vec::new());
        };

        let mut dashboards = Vec::with_capacity(buildings.len());
        for (building, units) in buildings {
            let mut pending = Vec::new();
            let mut past = Vec::new();
            for (unit, invitations) in &units {
                for invitation in invitations {
                    let view = InvitationView::from_rows(unit, invitation);
                    match invitation.status {
                        InvitationStatus::Pending => pending.push(view),
                        InvitationStatus::Used => past.push(view),
                    }
                }
            }

            let mut active = Vec::new();
            for renter in renters
                .iter()
                .filter(|renter| renter.building_name == building.name)
            {
                active.push(self.renter_view(renter)?);
            }

            dashboards.push(BuildingDashboard {
                building_id: building.id,
                name: building.name,
                postal_code: building.postal_code,
                pending,
                past,
                renters: active,
            });
        }

        Ok(dashboards)
    }

    fn renter_view(&self, renter: &RenterRecord) -> Result<ActiveRenterView, DashboardError> {
        let latest = self
            .submissions
            .submissions_for_renter(&renter.id)?
            .into_iter()
            .max_by_key(|meta| meta.uploaded_at)
            .map(SubmissionView::from_meta);

        Ok(ActiveRenterView {
            renter_id: renter.id.clone(),
            full_name: renter.full_name.clone(),
            email: renter.email.clone(),
            unit_number: renter.unit_number.clone(),
            latest_submission: latest,
        })
    }
}

/// One building's slice of the dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct BuildingDashboard {
    pub building_id: BuildingId,
    pub name: String,
    pub postal_code: String,
    /// Outstanding invitations, tokens visible so the admin can resend them.
    pub pending: Vec<InvitationView>,
    /// Redeemed invitations, tokens retained for audit display.
    pub past: Vec<InvitationView>,
    pub renters: Vec<ActiveRenterView>,
}

/// Invitation row as the dashboard shows it.
#[derive(Debug, Clone, Serialize)]
pub struct InvitationView {
    pub invitation_id: InvitationId,
    pub unit_number: String,
    pub renter_name: String,
    pub renter_email: String,
    pub token: AccessToken,
    pub invited_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activated_at: Option<DateTime<Utc>>,
}

impl InvitationView {
    fn from_rows(unit: &UnitRecord, invitation: &InvitationRecord) -> Self {
        Self {
            invitation_id: invitation.id.clone(),
            unit_number: unit.unit_number.clone(),
            renter_name: invitation.renter_name.clone(),
            renter_email: invitation.renter_email.clone(),
            token: invitation.token.clone(),
            invited_at: invitation.created_at,
            activated_at: invitation.activated_at,
        }
    }
}

/// Redeemed renter with their most recent inspection submission, if any.
#[derive(Debug, Clone, Serialize)]
pub struct ActiveRenterView {
    pub renter_id: RenterId,
    pub full_name: String,
    pub email: String,
    pub unit_number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_submission: Option<SubmissionView>,
}

/// Submission metadata surfaced on the dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct SubmissionView {
    pub filename: String,
    pub size_bytes: u64,
    pub uploaded_at: DateTime<Utc>,
}

impl SubmissionView {
    fn from_meta(meta: SubmissionMeta) -> Self {
        Self {
            filename: meta.filename,
            size_bytes: meta.size_bytes,
            uploaded_at: meta.uploaded_at,
        }
    }
}

/// Dashboard projection failure.
#[derive(Debug, thiserror::Error)]
pub enum DashboardError {
    #[error("dashboard read failed")]
    Store(#[from] StoreError),
    #[error("submission directory lookup failed")]
    Submissions(#[from] SubmissionError),
}
