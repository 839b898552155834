use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use super::allocator::{AllocationError, OsTokenSampler, TokenAllocator, TokenSampler};
use super::domain::{
    email_key, mint_id, normalized, AdminId, BuildingDraft, BuildingId, BuildingRecord, CompanyId,
    CompanyRecord, FieldIssue, InvitationId, InvitationRecord, InvitationStatus, PortfolioDraft,
    RenterEntry, UnitDraft, UnitId, UnitRecord, ValidationIssues,
};
use super::mailer::{InvitationEmail, InvitationMailer};
use super::repository::{PortfolioStore, PortfolioTx, StoreError};

/// Applies a full desired-state tree for one company in a single transaction.
///
/// Safe to call repeatedly with the same or an evolving payload: matched rows
/// keep their ids, matched invitations keep their tokens and statuses, and
/// anything absent from the payload is deleted (with cascades) before the
/// transaction commits. A failure anywhere rolls the whole save back.
pub struct ReconciliationEngine<S, M, T = OsTokenSampler> {
    store: Arc<S>,
    mailer: Arc<M>,
    allocator: TokenAllocator<T>,
}

impl<S, M> ReconciliationEngine<S, M, OsTokenSampler>
where
    S: PortfolioStore,
    M: InvitationMailer,
{
    pub fn new(store: Arc<S>, mailer: Arc<M>) -> Self {
        Self::with_allocator(store, mailer, TokenAllocator::new(OsTokenSampler))
    }
}

impl<S, M, T> ReconciliationEngine<S, M, T>
where
    S: PortfolioStore,
    M: InvitationMailer,
    T: TokenSampler,
{
    pub fn with_allocator(store: Arc<S>, mailer: Arc<M>, allocator: TokenAllocator<T>) -> Self {
        Self {
            store,
            mailer,
            allocator,
        }
    }

    /// Diff the submitted tree against persisted state and apply the result
    /// atomically, returning the id of the admin's (single) company.
    ///
    /// Emails for newly created invitations are dispatched best-effort after
    /// the transaction commits; delivery failures are logged and swallowed.
    pub fn reconcile(
        &self,
        admin: &AdminId,
        draft: PortfolioDraft,
    ) -> Result<CompanyId, ReconcileError> {
        let draft = normalize_draft(draft).map_err(ReconcileError::Validation)?;

        let (company_id, outbox) = self
            .store
            .transaction(|tx| self.apply(tx, admin, &draft))?;

        debug!(
            company = %company_id.0,
            new_invitations = outbox.len(),
            "portfolio reconciled"
        );

        for email in &outbox {
            if let Err(error) = self.mailer.send_invitation(email) {
                warn!(
                    renter = %email.renter_email,
                    %error,
                    "invitation email delivery failed"
                );
            }
        }

        Ok(company_id)
    }

    fn apply(
        &self,
        tx: &mut dyn PortfolioTx,
        admin: &AdminId,
        draft: &NormalizedDraft,
    ) -> Result<(CompanyId, Vec<InvitationEmail>), ReconcileError> {
        let company_id = match tx.company_by_admin(admin)? {
            Some(existing) => {
                let mut updated = existing;
                updated.name = draft.company_name.clone();
                updated.contact_email = draft.contact_email.clone();
                let id = updated.id.clone();
                tx.update_company(updated)?;
                id
            }
            None => {
                let id = CompanyId(mint_id("co"));
                tx.insert_company(CompanyRecord {
                    id: id.clone(),
                    admin_id: admin.clone(),
                    name: draft.company_name.clone(),
                    contact_email: draft.contact_email.clone(),
                })?;
                id
            }
        };

        let mut outbox = Vec::new();

        // Diff scoped to this company's actual rows. Client-supplied ids that
        // are not in this set fall through to inserts, where an id owned by
        // another company hits the global key conflict and aborts the save.
        let existing = tx.buildings_for_company(&company_id)?;
        let existing_ids: HashSet<BuildingId> =
            existing.iter().map(|building| building.id.clone()).collect();
        let desired_ids: HashSet<BuildingId> = draft
            .buildings
            .iter()
            .filter_map(|building| building.id.clone())
            .collect();

        for stale in &existing {
            if !desired_ids.contains(&stale.id) {
                tx.delete_building(&stale.id)?;
            }
        }

        for building in &draft.buildings {
            let record = |id: BuildingId| BuildingRecord {
                id,
                company_id: company_id.clone(),
                name: building.name.clone(),
                postal_code: building.postal_code.clone(),
            };
            let building_id = match &building.id {
                Some(id) if existing_ids.contains(id) => {
                    tx.update_building(record(id.clone()))?;
                    id.clone()
                }
                other => {
                    let id = other.clone().unwrap_or_else(|| BuildingId(mint_id("bld")));
                    tx.insert_building(record(id.clone()))?;
                    id
                }
            };

            self.apply_units(tx, draft, building, &building_id, &mut outbox)?;
        }

        Ok((company_id, outbox))
    }

    fn apply_units(
        &self,
        tx: &mut dyn PortfolioTx,
        draft: &NormalizedDraft,
        building: &NormalizedBuilding,
        building_id: &BuildingId,
        outbox: &mut Vec<InvitationEmail>,
    ) -> Result<(), ReconcileError> {
        let existing = tx.units_for_building(building_id)?;
        let existing_ids: HashSet<UnitId> = existing.iter().map(|unit| unit.id.clone()).collect();
        let desired_ids: HashSet<UnitId> = building
            .units
            .iter()
            .filter_map(|unit| unit.id.clone())
            .collect();

        for stale in &existing {
            if !desired_ids.contains(&stale.id) {
                tx.delete_unit(&stale.id)?;
            }
        }

        for unit in &building.units {
            let record = |id: UnitId| UnitRecord {
                id,
                building_id: building_id.clone(),
                unit_number: unit.unit_number.clone(),
            };
            let unit_id = match &unit.id {
                Some(id) if existing_ids.contains(id) => {
                    tx.update_unit(record(id.clone()))?;
                    id.clone()
                }
                other => {
                    let id = other.clone().unwrap_or_else(|| UnitId(mint_id("unit")));
                    tx.insert_unit(record(id.clone()))?;
                    id
                }
            };

            self.apply_invitations(tx, draft, building, unit, &unit_id, outbox)?;
        }

        Ok(())
    }

    fn apply_invitations(
        &self,
        tx: &mut dyn PortfolioTx,
        draft: &NormalizedDraft,
        building: &NormalizedBuilding,
        unit: &NormalizedUnit,
        unit_id: &UnitId,
        outbox: &mut Vec<InvitationEmail>,
    ) -> Result<(), ReconcileError> {
        let mut by_email: HashMap<String, InvitationRecord> = tx
            .invitations_for_unit(unit_id)?
            .into_iter()
            .map(|invitation| (email_key(&invitation.renter_email), invitation))
            .collect();
        let mut seen = HashSet::new();

        for renter in &unit.renters {
            // duplicate emails within one payload collapse to the first slot
            if !seen.insert(renter.email_key.clone()) {
                continue;
            }

            match by_email.remove(&renter.email_key) {
                Some(matched) => {
                    // same email keeps its id and token; used rows are
                    // immutable so only pending ones take a name update
                    if matched.status == InvitationStatus::Pending
                        && matched.renter_name != renter.full_name
                    {
                        let mut updated = matched;
                        updated.renter_name = renter.full_name.clone();
                        tx.update_invitation(updated)?;
                    }
                }
                None => {
                    let token = self.allocator.allocate(tx)?;
                    tx.insert_invitation(InvitationRecord {
                        id: InvitationId(mint_id("inv")),
                        unit_id: unit_id.clone(),
                        renter_name: renter.full_name.clone(),
                        renter_email: renter.email.clone(),
                        token: token.clone(),
                        status: InvitationStatus::Pending,
                        created_at: Utc::now(),
                        activated_at: None,
                    })?;
                    outbox.push(InvitationEmail {
                        renter_name: renter.full_name.clone(),
                        renter_email: renter.email.clone(),
                        company_name: draft.company_name.clone(),
                        building_name: building.name.clone(),
                        unit_number: unit.unit_number.clone(),
                        token,
                    });
                }
            }
        }

        // Emails absent from the payload lose their rows, used ones included;
        // the renter account minted at redemption lives on independently.
        for removed in by_email.into_values() {
            tx.delete_invitation(&removed.id)?;
        }

        Ok(())
    }
}

/// Error raised by [`ReconciliationEngine::reconcile`].
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// Malformed top-level fields, reported before any transaction opens.
    #[error("{0}")]
    Validation(ValidationIssues),
    /// Token space collision retries exhausted; retryable server error.
    #[error(transparent)]
    Allocation(AllocationError),
    /// Any mid-transaction storage failure. Rendered generically because the
    /// rollback guarantees no partial state exists to describe.
    #[error("portfolio reconciliation failed")]
    Failed(#[source] StoreError),
}

impl From<StoreError> for ReconcileError {
    fn from(value: StoreError) -> Self {
        Self::Failed(value)
    }
}

impl From<AllocationError> for ReconcileError {
    fn from(value: AllocationError) -> Self {
        match value {
            AllocationError::Store(source) => Self::Failed(source),
            exhausted => Self::Allocation(exhausted),
        }
    }
}

struct NormalizedDraft {
    company_name: String,
    contact_email: String,
    buildings: Vec<NormalizedBuilding>,
}

struct NormalizedBuilding {
    id: Option<BuildingId>,
    name: String,
    postal_code: String,
    units: Vec<NormalizedUnit>,
}

struct NormalizedUnit {
    id: Option<UnitId>,
    unit_number: String,
    renters: Vec<NormalizedRenter>,
}

struct NormalizedRenter {
    full_name: String,
    email: String,
    email_key: String,
}

/// Trim the payload, rejecting blank top-level fields and silently dropping
/// blank-after-trim building/unit/renter slots (the "added a row, then
/// abandoned it" case from the portfolio editor).
fn normalize_draft(draft: PortfolioDraft) -> Result<NormalizedDraft, ValidationIssues> {
    let mut issues = Vec::new();
    let company_name = normalized(&draft.company_name);
    if company_name.is_none() {
        issues.push(FieldIssue {
            field: "company_name",
            message: "must not be blank",
        });
    }
    let contact_email = normalized(&draft.contact_email);
    if contact_email.is_none() {
        issues.push(FieldIssue {
            field: "contact_email",
            message: "must not be blank",
        });
    }

    match (company_name, contact_email) {
        (Some(company_name), Some(contact_email)) => Ok(NormalizedDraft {
            company_name,
            contact_email,
            buildings: draft
                .buildings
                .into_iter()
                .filter_map(normalize_building)
                .collect(),
        }),
        _ => Err(ValidationIssues { issues }),
    }
}

fn normalize_building(draft: BuildingDraft) -> Option<NormalizedBuilding> {
    let name = normalized(&draft.name)?;
    let postal_code = normalized(&draft.postal_code)?;
    Some(NormalizedBuilding {
        id: draft.id,
        name,
        postal_code,
        units: draft.units.into_iter().filter_map(normalize_unit).collect(),
    })
}

fn normalize_unit(draft: UnitDraft) -> Option<NormalizedUnit> {
    let unit_number = normalized(&draft.unit_number)?;
    Some(NormalizedUnit {
        id: draft.id,
        unit_number,
        renters: draft
            .renters
            .into_iter()
            .filter_map(normalize_renter)
            .collect(),
    })
}

fn normalize_renter(entry: RenterEntry) -> Option<NormalizedRenter> {
    let email = normalized(&entry.email)?;
    Some(NormalizedRenter {
        full_name: entry.full_name.trim().to_string(),
        email_key: email_key(&email),
        email,
    })
}
