use chrono::Utc;

use super::common::{FixedSampler, ScriptedSampler};
use crate::portfolio::allocator::{AllocationError, TokenAllocator};
use crate::portfolio::domain::{
    AccessToken, InvitationId, InvitationRecord, InvitationStatus, UnitId,
};
use crate::portfolio::memory::MemoryPortfolioStore;
use crate::portfolio::repository::{PortfolioStore, StoreError};

fn seeded_invitation(token: &str) -> InvitationRecord {
    InvitationRecord {
        id: InvitationId(format!("inv-seeded-{token}")),
        unit_id: UnitId("u-1".to_string()),
        renter_name: "Seeded Renter".to_string(),
        renter_email: format!("seeded-{token}@x.com"),
        token: AccessToken::parse(token).expect("valid fixture token"),
        status: InvitationStatus::Pending,
        created_at: Utc::now(),
        activated_at: None,
    }
}

#[test]
fn tokens_are_six_digit_zero_padded() {
    let store = MemoryPortfolioStore::default();
    let allocator = TokenAllocator::new(FixedSampler(42_017));

    let token: Result<_, StoreError> = store.transaction(|tx| {
        allocator
            .allocate(tx)
            .map_err(|_| StoreError::Unavailable("allocation failed".to_string()))
    });

    assert_eq!(token.expect("allocates").as_str(), "042017");
}

#[test]
fn collisions_retry_until_a_free_token_appears() {
    let store = MemoryPortfolioStore::default();
    let allocator = TokenAllocator::new(ScriptedSampler::new([7, 7, 123]));

    let token: Result<_, StoreError> = store.transaction(|tx| {
        tx.insert_invitation(seeded_invitation("000007"))?;
        allocator
            .allocate(tx)
            .map_err(|_| StoreError::Unavailable("allocation failed".to_string()))
    });

    assert_eq!(token.expect("allocates").as_str(), "000123");
}

#[test]
fn exhaustion_surfaces_after_the_retry_budget() {
    let store = MemoryPortfolioStore::default();
    let allocator = TokenAllocator::new(FixedSampler(7));

    let outcome: Result<(), StoreError> = store.transaction(|tx| {
        tx.insert_invitation(seeded_invitation("000007"))?;
        match allocator.allocate(tx) {
            Err(AllocationError::Exhausted { attempts: 10 }) => Ok(()),
            other => panic!("expected exhaustion after 10 attempts, got {other:?}"),
        }
    });
    outcome.expect("transaction completes");
}

#[test]
fn deleting_an_invitation_frees_its_token() {
    let store = MemoryPortfolioStore::default();
    let allocator = TokenAllocator::new(FixedSampler(7));

    let token: Result<_, StoreError> = store.transaction(|tx| {
        let seeded = seeded_invitation("000007");
        let id = seeded.id.clone();
        tx.insert_invitation(seeded)?;
        tx.delete_invitation(&id)?;
        allocator
            .allocate(tx)
            .map_err(|_| StoreError::Unavailable("allocation failed".to_string()))
    });

    assert_eq!(token.expect("allocates").as_str(), "000007");
}

#[test]
fn custom_budget_bounds_the_retry_loop() {
    let store = MemoryPortfolioStore::default();
    let allocator = TokenAllocator::with_budget(FixedSampler(7), 3);

    let outcome: Result<(), StoreError> = store.transaction(|tx| {
        tx.insert_invitation(seeded_invitation("000007"))?;
        match allocator.allocate(tx) {
            Err(AllocationError::Exhausted { attempts: 3 }) => Ok(()),
            other => panic!("expected exhaustion after 3 attempts, got {other:?}"),
        }
    });
    outcome.expect("transaction completes");
}
