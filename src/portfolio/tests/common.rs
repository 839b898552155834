use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::portfolio::allocator::{TokenAllocator, TokenSampler};
use crate::portfolio::domain::{
    AccessToken, AdminId, BuildingDraft, BuildingId, BuildingRecord, CompanyId, CompanyRecord,
    InvitationId, InvitationRecord, PortfolioDraft, RenterEntry, RenterRecord, UnitDraft, UnitId,
    UnitRecord,
};
use crate::portfolio::mailer::{InvitationEmail, InvitationMailer, MailerError};
use crate::portfolio::memory::MemoryPortfolioStore;
use crate::portfolio::reconcile::ReconciliationEngine;
use crate::portfolio::repository::{PortfolioStore, PortfolioTx, StoreError};

pub(super) fn admin() -> AdminId {
    AdminId("admin-1".to_string())
}

pub(super) fn other_admin() -> AdminId {
    AdminId("admin-2".to_string())
}

pub(super) fn renter(full_name: &str, email: &str) -> RenterEntry {
    RenterEntry {
        id: None,
        full_name: full_name.to_string(),
        email: email.to_string(),
    }
}

pub(super) fn unit(id: &str, unit_number: &str, renters: Vec<RenterEntry>) -> UnitDraft {
    UnitDraft {
        id: Some(UnitId(id.to_string())),
        unit_number: unit_number.to_string(),
        renters,
    }
}

pub(super) fn building(
    id: &str,
    name: &str,
    postal_code: &str,
    units: Vec<UnitDraft>,
) -> BuildingDraft {
    BuildingDraft {
        id: Some(BuildingId(id.to_string())),
        name: name.to_string(),
        postal_code: postal_code.to_string(),
        units,
    }
}

pub(super) fn draft_with(buildings: Vec<BuildingDraft>) -> PortfolioDraft {
    PortfolioDraft {
        company_name: "Maple Property Group".to_string(),
        contact_email: "office@maplepg.example.com".to_string(),
        buildings,
    }
}

/// Standard fixture: one building, one unit, one renter.
pub(super) fn maple_draft() -> PortfolioDraft {
    draft_with(vec![building(
        "b-maple",
        "Maple Apts",
        "10001",
        vec![unit("u-4b", "4B", vec![renter("Jane Doe", "jane@x.com")])],
    )])
}

/// Deterministic sampler handing out sequential raw values, so every
/// allocation in a test run gets a distinct collision-free token.
#[derive(Default)]
pub(super) struct CountingSampler {
    next: AtomicU32,
}

impl TokenSampler for CountingSampler {
    fn sample(&self) -> u32 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

/// Sampler that always returns the same raw value; pairs with a seeded
/// invitation to force collisions.
pub(super) struct FixedSampler(pub(super) u32);

impl TokenSampler for FixedSampler {
    fn sample(&self) -> u32 {
        self.0
    }
}

/// Sampler that replays a script, then falls back to a high counter.
pub(super) struct ScriptedSampler {
    script: Mutex<VecDeque<u32>>,
    fallback: AtomicU32,
}

impl ScriptedSampler {
    pub(super) fn new(values: impl IntoIterator<Item = u32>) -> Self {
        Self {
            script: Mutex::new(values.into_iter().collect()),
            fallback: AtomicU32::new(900_000),
        }
    }
}

impl TokenSampler for ScriptedSampler {
    fn sample(&self) -> u32 {
        let scripted = self
            .script
            .lock()
            .expect("sampler mutex poisoned")
            .pop_front();
        scripted.unwrap_or_else(|| self.fallback.fetch_add(1, Ordering::Relaxed))
    }
}

/// Mail double capturing every dispatched invitation, optionally failing.
#[derive(Default)]
pub(super) struct MemoryMailer {
    sent: Mutex<Vec<InvitationEmail>>,
    failing: AtomicBool,
}

impl MemoryMailer {
    pub(super) fn sent(&self) -> Vec<InvitationEmail> {
        self.sent.lock().expect("mailer mutex poisoned").clone()
    }

    pub(super) fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }
}

impl InvitationMailer for MemoryMailer {
    fn send_invitation(&self, email: &InvitationEmail) -> Result<(), MailerError> {
        if self.failing.load(Ordering::Relaxed) {
            return Err(MailerError::Transport("smtp offline".to_string()));
        }
        self.sent
            .lock()
            .expect("mailer mutex poisoned")
            .push(email.clone());
        Ok(())
    }
}

pub(super) type TestEngine =
    ReconciliationEngine<MemoryPortfolioStore, MemoryMailer, CountingSampler>;

pub(super) fn build_engine() -> (TestEngine, Arc<MemoryPortfolioStore>, Arc<MemoryMailer>) {
    let store = Arc::new(MemoryPortfolioStore::default());
    let mailer = Arc::new(MemoryMailer::default());
    let engine = ReconciliationEngine::with_allocator(
        store.clone(),
        mailer.clone(),
        TokenAllocator::new(CountingSampler::default()),
    );
    (engine, store, mailer)
}

/// Store wrapper that starts refusing writes once the configured budget is
/// spent, for asserting that a failed save leaves nothing behind.
pub(super) struct FaultyStore {
    pub(super) inner: MemoryPortfolioStore,
    write_budget: AtomicUsize,
}

impl FaultyStore {
    pub(super) fn with_write_budget(budget: usize) -> Self {
        Self {
            inner: MemoryPortfolioStore::default(),
            write_budget: AtomicUsize::new(budget),
        }
    }

    pub(super) fn set_write_budget(&self, budget: usize) {
        self.write_budget.store(budget, Ordering::Relaxed);
    }
}

impl PortfolioStore for FaultyStore {
    fn transaction<T, E>(
        &self,
        work: impl FnOnce(&mut dyn PortfolioTx) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        self.inner.transaction(|tx| {
            let mut limited = LimitedTx {
                inner: tx,
                budget: &self.write_budget,
            };
            work(&mut limited)
        })
    }
}

struct LimitedTx<'a> {
    inner: &'a mut dyn PortfolioTx,
    budget: &'a AtomicUsize,
}

impl LimitedTx<'_> {
    fn spend(&self) -> Result<(), StoreError> {
        self.budget
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |budget| {
                budget.checked_sub(1)
            })
            .map(|_| ())
            .map_err(|_| StoreError::Unavailable("injected fault".to_string()))
    }
}

impl PortfolioTx for LimitedTx<'_> {
    fn company_by_admin(&mut self, admin: &AdminId) -> Result<Option<CompanyRecord>, StoreError> {
        self.inner.company_by_admin(admin)
    }

    fn company_by_id(
        &mut self,
        id: &CompanyId,
    ) -> Result<Option<CompanyRecord>, StoreError> {
        self.inner.company_by_id(id)
    }

    fn insert_company(&mut self, company: CompanyRecord) -> Result<(), StoreError> {
        self.spend()?;
        self.inner.insert_company(company)
    }

    fn update_company(&mut self, company: CompanyRecord) -> Result<(), StoreError> {
        self.spend()?;
        self.inner.update_company(company)
    }

    fn buildings_for_company(
        &mut self,
        company: &CompanyId,
    ) -> Result<Vec<BuildingRecord>, StoreError> {
        self.inner.buildings_for_company(company)
    }

    fn building_by_id(&mut self, id: &BuildingId) -> Result<Option<BuildingRecord>, StoreError> {
        self.inner.building_by_id(id)
    }

    fn insert_building(&mut self, building: BuildingRecord) -> Result<(), StoreError> {
        self.spend()?;
        self.inner.insert_building(building)
    }

    fn update_building(&mut self, building: BuildingRecord) -> Result<(), StoreError> {
        self.spend()?;
        self.inner.update_building(building)
    }

    fn delete_building(&mut self, id: &BuildingId) -> Result<(), StoreError> {
        self.spend()?;
        self.inner.delete_building(id)
    }

    fn units_for_building(
        &mut self,
        building: &BuildingId,
    ) -> Result<Vec<UnitRecord>, StoreError> {
        self.inner.units_for_building(building)
    }

    fn unit_by_id(&mut self, id: &UnitId) -> Result<Option<UnitRecord>, StoreError> {
        self.inner.unit_by_id(id)
    }

    fn insert_unit(&mut self, unit: UnitRecord) -> Result<(), StoreError> {
        self.spend()?;
        self.inner.insert_unit(unit)
    }

    fn update_unit(&mut self, unit: UnitRecord) -> Result<(), StoreError> {
        self.spend()?;
        self.inner.update_unit(unit)
    }

    fn delete_unit(&mut self, id: &UnitId) -> Result<(), StoreError> {
        self.spend()?;
        self.inner.delete_unit(id)
    }

    fn invitations_for_unit(
        &mut self,
        unit: &UnitId,
    ) -> Result<Vec<InvitationRecord>, StoreError> {
        self.inner.invitations_for_unit(unit)
    }

    fn invitation_by_id(
        &mut self,
        id: &InvitationId,
    ) -> Result<Option<InvitationRecord>, StoreError> {
        self.inner.invitation_by_id(id)
    }

    fn invitation_by_token(
        &mut self,
        token: &AccessToken,
    ) -> Result<Option<InvitationRecord>, StoreError> {
        self.inner.invitation_by_token(token)
    }

    fn insert_invitation(&mut self, invitation: InvitationRecord) -> Result<(), StoreError> {
        self.spend()?;
        self.inner.insert_invitation(invitation)
    }

    fn update_invitation(&mut self, invitation: InvitationRecord) -> Result<(), StoreError> {
        self.spend()?;
        self.inner.update_invitation(invitation)
    }

    fn delete_invitation(&mut self, id: &InvitationId) -> Result<(), StoreError> {
        self.spend()?;
        self.inner.delete_invitation(id)
    }

    fn insert_renter(&mut self, renter: RenterRecord) -> Result<(), StoreError> {
        self.spend()?;
        self.inner.insert_renter(renter)
    }

    fn renters_for_company(
        &mut self,
        company: &CompanyId,
    ) -> Result<Vec<RenterRecord>, StoreError> {
        self.inner.renters_for_company(company)
    }
}

/// Read the stored {building name, unit number, renter email} triples for an
/// admin, sorted for comparison against a desired tree.
pub(super) fn stored_triples<S: PortfolioStore>(
    store: &S,
    admin: &AdminId,
) -> Vec<(String, String, String)> {
    let triples: Result<_, StoreError> = store.transaction(|tx| {
        let mut triples = Vec::new();
        if let Some(company) = tx.company_by_admin(admin)? {
            for building in tx.buildings_for_company(&company.id)? {
                for unit in tx.units_for_building(&building.id)? {
                    for invitation in tx.invitations_for_unit(&unit.id)? {
                        triples.push((
                            building.name.clone(),
                            unit.unit_number.clone(),
                            invitation.renter_email.clone(),
                        ));
                    }
                }
            }
        }
        Ok(triples)
    });
    let mut triples = triples.expect("state readable");
    triples.sort();
    triples
}

pub(super) fn invitations_for_admin<S: PortfolioStore>(
    store: &S,
    admin: &AdminId,
) -> Vec<InvitationRecord> {
    let rows: Result<_, StoreError> = store.transaction(|tx| {
        let mut rows = Vec::new();
        if let Some(company) = tx.company_by_admin(admin)? {
            for building in tx.buildings_for_company(&company.id)? {
                for unit in tx.units_for_building(&building.id)? {
                    rows.extend(tx.invitations_for_unit(&unit.id)?);
                }
            }
        }
        Ok(rows)
    });
    let mut rows = rows.expect("state readable");
    rows.sort_by(|a, b| a.id.cmp(&b.id));
    rows
}

pub(super) fn renters_for_admin<S: PortfolioStore>(
    store: &S,
    admin: &AdminId,
) -> Vec<RenterRecord> {
    let rows: Result<_, StoreError> = store.transaction(|tx| {
        match tx.company_by_admin(admin)? {
            Some(company) => tx.renters_for_company(&company.id),
            None => Ok(Vec::new()),
        }
    });
    rows.expect("state readable")
}

pub(super) fn company_for_admin<S: PortfolioStore>(
    store: &S,
    admin: &AdminId,
) -> Option<CompanyRecord> {
    let company: Result<_, StoreError> = store.transaction(|tx| tx.company_by_admin(admin));
    company.expect("state readable")
}

pub(super) fn token_for_email<S: PortfolioStore>(
    store: &S,
    admin: &AdminId,
    email: &str,
) -> AccessToken {
    invitations_for_admin(store, admin)
        .into_iter()
        .find(|invitation| invitation.renter_email.eq_ignore_ascii_case(email))
        .map(|invitation| invitation.token)
        .expect("invitation present")
}
