use std::sync::Arc;

use chrono::Utc;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::info;

use super::domain::{
    email_key, mint_id, normalized, AccessToken, AdminId, BuildingRecord, CompanyRecord,
    CredentialHash, InvitationId, InvitationRecord, InvitationStatus, RenterId, RenterRecord,
    UnitRecord,
};
use super::repository::{PortfolioStore, PortfolioTx, StoreError};

/// Hashes renter passwords at redemption time. A trait seam so tests can
/// assert on deterministic output and deployments can swap in a slower KDF.
pub trait CredentialHasher: Send + Sync {
    fn hash(&self, password: &str) -> CredentialHash;
    fn verify(&self, password: &str, stored: &CredentialHash) -> bool;
}

/// Salted SHA-256 credential hasher.
#[derive(Debug, Default, Clone, Copy)]
pub struct Sha256CredentialHasher;

impl Sha256CredentialHasher {
    fn digest(salt: &str, password: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(salt.as_bytes());
        hasher.update(password.as_bytes());
        hex_encode(&hasher.finalize())
    }
}

impl CredentialHasher for Sha256CredentialHasher {
    fn hash(&self, password: &str) -> CredentialHash {
        let mut salt_bytes = [0u8; 16];
        OsRng.fill_bytes(&mut salt_bytes);
        let salt = hex_encode(&salt_bytes);
        let digest = Self::digest(&salt, password);
        CredentialHash { salt, digest }
    }

    fn verify(&self, password: &str, stored: &CredentialHash) -> bool {
        Self::digest(&stored.salt, password) == stored.digest
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}

/// Governs the single transition an invitation undergoes outside of
/// reconciliation: pending → used at redemption. Withdrawal of a pending
/// invitation is modeled as outright deletion; there is no stored expired or
/// revoked state.
pub struct InvitationLifecycle<S, H = Sha256CredentialHasher> {
    store: Arc<S>,
    hasher: H,
}

impl<S> InvitationLifecycle<S, Sha256CredentialHasher>
where
    S: PortfolioStore,
{
    pub fn new(store: Arc<S>) -> Self {
        Self::with_hasher(store, Sha256CredentialHasher)
    }
}

impl<S, H> InvitationLifecycle<S, H>
where
    S: PortfolioStore,
    H: CredentialHasher,
{
    pub fn with_hasher(store: Arc<S>, hasher: H) -> Self {
        Self { store, hasher }
    }

    /// Exchange a pending token for a renter account.
    ///
    /// Only the originally invited address may redeem: the supplied email is
    /// compared case-insensitively against the invitation's stored one before
    /// anything is written. Account creation and the status flip to used
    /// commit together or not at all.
    pub fn redeem(
        &self,
        token: &str,
        email: &str,
        full_name: &str,
        password: &str,
    ) -> Result<RenterId, RedeemError> {
        let token = AccessToken::parse(token).ok_or(RedeemError::TokenNotFound)?;

        let renter_id = self.store.transaction(|tx| {
            let invitation = tx
                .invitation_by_token(&token)?
                .ok_or(RedeemError::TokenNotFound)?;
            if invitation.status == InvitationStatus::Used {
                return Err(RedeemError::AlreadyUsed);
            }
            if email_key(email) != email_key(&invitation.renter_email) {
                return Err(RedeemError::EmailMismatch);
            }

            let (unit, building, company) = ownership_chain(tx, &invitation)?;

            let renter = RenterRecord {
                id: RenterId(mint_id("rnt")),
                full_name: normalized(full_name)
                    .unwrap_or_else(|| invitation.renter_name.clone()),
                email: invitation.renter_email.clone(),
                credentials: self.hasher.hash(password),
                company_id: company.id.clone(),
                company_name: company.name.clone(),
                building_name: building.name.clone(),
                unit_number: unit.unit_number.clone(),
                created_at: Utc::now(),
            };
            let renter_id = renter.id.clone();
            tx.insert_renter(renter)?;

            let mut consumed = invitation;
            consumed.status = InvitationStatus::Used;
            consumed.activated_at = Some(Utc::now());
            tx.update_invitation(consumed)?;

            Ok(renter_id)
        })?;

        info!(renter = %renter_id.0, "invitation redeemed");
        Ok(renter_id)
    }

    /// Delete a still-pending invitation, provided the requesting admin owns
    /// the unit → building → company chain it hangs off.
    pub fn withdraw(
        &self,
        invitation_id: &InvitationId,
        admin: &AdminId,
    ) -> Result<(), WithdrawError> {
        self.store.transaction(|tx| {
            let invitation = tx
                .invitation_by_id(invitation_id)?
                .ok_or(WithdrawError::NotFound)?;
            let (_, _, company) = ownership_chain(tx, &invitation)?;
            if company.admin_id != *admin {
                return Err(WithdrawError::Forbidden);
            }
            if invitation.status == InvitationStatus::Used {
                return Err(WithdrawError::AlreadyUsed);
            }
            tx.delete_invitation(&invitation.id)?;
            Ok(())
        })
    }

    /// Resolve the registration-page preview for a token. Status is not
    /// checked here; redemption enforces single use.
    pub fn preview(&self, token: &str) -> Result<InvitationPreview, PreviewError> {
        let token = AccessToken::parse(token).ok_or(PreviewError::NotFound)?;

        self.store.transaction(|tx| {
            let invitation = tx
                .invitation_by_token(&token)?
                .ok_or(PreviewError::NotFound)?;
            let (unit, building, _) = ownership_chain(tx, &invitation)?;
            Ok(InvitationPreview {
                renter_name: invitation.renter_name,
                renter_email: invitation.renter_email,
                building_name: building.name,
                unit_number: unit.unit_number,
            })
        })
    }
}

/// Walk invitation → unit → building → company. A broken link means the
/// store's cascade guarantees were violated, so it surfaces as a storage
/// error rather than a policy one.
fn ownership_chain(
    tx: &mut dyn PortfolioTx,
    invitation: &InvitationRecord,
) -> Result<(UnitRecord, BuildingRecord, CompanyRecord), StoreError> {
    let unit = tx.unit_by_id(&invitation.unit_id)?.ok_or(StoreError::NotFound)?;
    let building = tx
        .building_by_id(&unit.building_id)?
        .ok_or(StoreError::NotFound)?;
    let company = tx
        .company_by_id(&building.company_id)?
        .ok_or(StoreError::NotFound)?;
    Ok((unit, building, company))
}

/// What the registration page shows before the renter commits to a password.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvitationPreview {
    pub renter_name: String,
    pub renter_email: String,
    pub building_name: String,
    pub unit_number: String,
}

/// Redemption failure.
#[derive(Debug, thiserror::Error)]
pub enum RedeemError {
    #[error("no invitation matches this token")]
    TokenNotFound,
    #[error("this invitation has already been redeemed")]
    AlreadyUsed,
    #[error("this invitation was issued to a different email address")]
    EmailMismatch,
    #[error("invitation redemption failed")]
    Store(#[source] StoreError),
}

impl From<StoreError> for RedeemError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

/// Withdrawal failure.
#[derive(Debug, thiserror::Error)]
pub enum WithdrawError {
    #[error("invitation not found")]
    NotFound,
    #[error("invitation belongs to another company")]
    Forbidden,
    #[error("a redeemed invitation cannot be withdrawn")]
    AlreadyUsed,
    #[error("invitation withdrawal failed")]
    Store(#[source] StoreError),
}

impl From<StoreError> for WithdrawError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

/// Preview failure.
#[derive(Debug, thiserror::Error)]
pub enum PreviewError {
    #[error("no invitation matches this token")]
    NotFound,
    #[error("invitation preview failed")]
    Store(#[source] StoreError),
}

impl From<StoreError> for PreviewError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}
