use std::collections::BTreeMap;
use std::sync::Mutex;

use super::domain::{
    email_key, AccessToken, AdminId, BuildingId, BuildingRecord, CompanyId, CompanyRecord,
    InvitationId, InvitationRecord, RenterId, RenterRecord, UnitId, UnitRecord,
};
use super::repository::{
    PortfolioStore, PortfolioTx, StoreError, SubmissionDirectory, SubmissionError, SubmissionMeta,
};

/// In-memory reference store. Real deployments wire the traits to a
/// relational database; this implementation exists for tests, demos, and as
/// the executable description of the expected transactional semantics.
///
/// Transactions run against a copy of the tables and replace them only when
/// the closure returns `Ok`, so a failed save observably rolls back.
#[derive(Default)]
pub struct MemoryPortfolioStore {
    tables: Mutex<Tables>,
}

#[derive(Debug, Clone, Default)]
struct Tables {
    companies: BTreeMap<CompanyId, CompanyRecord>,
    buildings: BTreeMap<BuildingId, BuildingRecord>,
    units: BTreeMap<UnitId, UnitRecord>,
    invitations: BTreeMap<InvitationId, InvitationRecord>,
    renters: BTreeMap<RenterId, RenterRecord>,
}

impl PortfolioStore for MemoryPortfolioStore {
    fn transaction<T, E>(
        &self,
        work: impl FnOnce(&mut dyn PortfolioTx) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        let mut guard = self
            .tables
            .lock()
            .map_err(|_| StoreError::Unavailable("store mutex poisoned".to_string()))?;
        let mut scratch = MemoryTx {
            tables: guard.clone(),
        };
        let value = work(&mut scratch)?;
        *guard = scratch.tables;
        Ok(value)
    }
}

struct MemoryTx {
    tables: Tables,
}

impl MemoryTx {
    fn cascade_delete_unit(&mut self, unit: &UnitId) {
        self.tables
            .invitations
            .retain(|_, invitation| invitation.unit_id != *unit);
        self.tables.units.remove(unit);
    }
}

impl PortfolioTx for MemoryTx {
    fn company_by_admin(&mut self, admin: &AdminId) -> Result<Option<CompanyRecord>, StoreError> {
        Ok(self
            .tables
            .companies
            .values()
            .find(|company| company.admin_id == *admin)
            .cloned())
    }

    fn company_by_id(&mut self, id: &CompanyId) -> Result<Option<CompanyRecord>, StoreError> {
        Ok(self.tables.companies.get(id).cloned())
    }

    fn insert_company(&mut self, company: CompanyRecord) -> Result<(), StoreError> {
        if self.tables.companies.contains_key(&company.id) {
            return Err(StoreError::Conflict);
        }
        self.tables.companies.insert(company.id.clone(), company);
        Ok(())
    }

    fn update_company(&mut self, company: CompanyRecord) -> Result<(), StoreError> {
        if !self.tables.companies.contains_key(&company.id) {
            return Err(StoreError::NotFound);
        }
        self.tables.companies.insert(company.id.clone(), company);
        Ok(())
    }

    fn buildings_for_company(
        &mut self,
        company: &CompanyId,
    ) -> Result<Vec<BuildingRecord>, StoreError> {
        Ok(self
            .tables
            .buildings
            .values()
            .filter(|building| building.company_id == *company)
            .cloned()
            .collect())
    }

    fn building_by_id(&mut self, id: &BuildingId) -> Result<Option<BuildingRecord>, StoreError> {
        Ok(self.tables.buildings.get(id).cloned())
    }

    fn insert_building(&mut self, building: BuildingRecord) -> Result<(), StoreError> {
        if self.tables.buildings.contains_key(&building.id) {
            return Err(StoreError::Conflict);
        }
        self.tables.buildings.insert(building.id.clone(), building);
        Ok(())
    }

    fn update_building(&mut self, building: BuildingRecord) -> Result<(), StoreError> {
        if !self.tables.buildings.contains_key(&building.id) {
            return Err(StoreError::NotFound);
        }
        self.tables.buildings.insert(building.id.clone(), building);
        Ok(())
    }

    fn delete_building(&mut self, id: &BuildingId) -> Result<(), StoreError> {
        if self.tables.buildings.remove(id).is_none() {
            return Err(StoreError::NotFound);
        }
        let orphaned: Vec<UnitId> = self
            .tables
            .units
            .values()
            .filter(|unit| unit.building_id == *id)
            .map(|unit| unit.id.clone())
            .collect();
        for unit in orphaned {
            self.cascade_delete_unit(&unit);
        }
        Ok(())
    }

    fn units_for_building(&mut self, building: &BuildingId) -> Result<Vec<UnitRecord>, StoreError> {
        Ok(self
            .tables
            .units
            .values()
            .filter(|unit| unit.building_id == *building)
            .cloned()
            .collect())
    }

    fn unit_by_id(&mut self, id: &UnitId) -> Result<Option<UnitRecord>, StoreError> {
        Ok(self.tables.units.get(id).cloned())
    }

    fn insert_unit(&mut self, unit: UnitRecord) -> Result<(), StoreError> {
        if self.tables.units.contains_key(&unit.id) {
            return Err(StoreError::Conflict);
        }
        self.tables.units.insert(unit.id.clone(), unit);
        Ok(())
    }

    fn update_unit(&mut self, unit: UnitRecord) -> Result<(), StoreError> {
        if !self.tables.units.contains_key(&unit.id) {
            return Err(StoreError::NotFound);
        }
        self.tables.units.insert(unit.id.clone(), unit);
        Ok(())
    }

    fn delete_unit(&mut self, id: &UnitId) -> Result<(), StoreError> {
        if !self.tables.units.contains_key(id) {
            return Err(StoreError::NotFound);
        }
        self.cascade_delete_unit(id);
        Ok(())
    }

    fn invitations_for_unit(
        &mut self,
        unit: &UnitId,
    ) -> Result<Vec<InvitationRecord>, StoreError> {
        Ok(self
            .tables
            .invitations
            .values()
            .filter(|invitation| invitation.unit_id == *unit)
            .cloned()
            .collect())
    }

    fn invitation_by_id(
        &mut self,
        id: &InvitationId,
    ) -> Result<Option<InvitationRecord>, StoreError> {
        Ok(self.tables.invitations.get(id).cloned())
    }

    fn invitation_by_token(
        &mut self,
        token: &AccessToken,
    ) -> Result<Option<InvitationRecord>, StoreError> {
        Ok(self
            .tables
            .invitations
            .values()
            .find(|invitation| invitation.token == *token)
            .cloned())
    }

    fn insert_invitation(&mut self, invitation: InvitationRecord) -> Result<(), StoreError> {
        if self.tables.invitations.contains_key(&invitation.id) {
            return Err(StoreError::Conflict);
        }
        // unique token index
        if self
            .tables
            .invitations
            .values()
            .any(|existing| existing.token == invitation.token)
        {
            return Err(StoreError::Conflict);
        }
        // per-unit case-insensitive email uniqueness
        if self.tables.invitations.values().any(|existing| {
            existing.unit_id == invitation.unit_id
                && email_key(&existing.renter_email) == email_key(&invitation.renter_email)
        }) {
            return Err(StoreError::Conflict);
        }
        self.tables
            .invitations
            .insert(invitation.id.clone(), invitation);
        Ok(())
    }

    fn update_invitation(&mut self, invitation: InvitationRecord) -> Result<(), StoreError> {
        if !self.tables.invitations.contains_key(&invitation.id) {
            return Err(StoreError::NotFound);
        }
        self.tables
            .invitations
            .insert(invitation.id.clone(), invitation);
        Ok(())
    }

    fn delete_invitation(&mut self, id: &InvitationId) -> Result<(), StoreError> {
        if self.tables.invitations.remove(id).is_none() {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    fn insert_renter(&mut self, renter: RenterRecord) -> Result<(), StoreError> {
        if self.tables.renters.contains_key(&renter.id) {
            return Err(StoreError::Conflict);
        }
        self.tables.renters.insert(renter.id.clone(), renter);
        Ok(())
    }

    fn renters_for_company(
        &mut self,
        company: &CompanyId,
    ) -> Result<Vec<RenterRecord>, StoreError> {
        Ok(self
            .tables
            .renters
            .values()
            .filter(|renter| renter.company_id == *company)
            .cloned()
            .collect())
    }
}

/// In-memory submission archive, writable so fixtures can seed uploads.
#[derive(Default)]
pub struct MemorySubmissionDirectory {
    uploads: Mutex<BTreeMap<RenterId, Vec<SubmissionMeta>>>,
}

impl MemorySubmissionDirectory {
    pub fn record(&self, renter: RenterId, meta: SubmissionMeta) {
        self.uploads
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry(renter)
            .or_default()
            .push(meta);
    }
}

impl SubmissionDirectory for MemorySubmissionDirectory {
    fn submissions_for_renter(
        &self,
        renter: &RenterId,
    ) -> Result<Vec<SubmissionMeta>, SubmissionError> {
        let uploads = self
            .uploads
            .lock()
            .map_err(|_| SubmissionError::Unavailable("submission mutex poisoned".to_string()))?;
        Ok(uploads.get(renter).cloned().unwrap_or_default())
    }
}
