use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for the authenticated property manager.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AdminId(pub String);

/// Identifier wrapper for a management company.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CompanyId(pub String);

/// Identifier wrapper for a building.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BuildingId(pub String);

/// Identifier wrapper for a unit within a building.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitId(pub String);

/// Identifier wrapper for a renter invitation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InvitationId(pub String);

/// Identifier wrapper for a redeemed renter account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RenterId(pub String);

/// Six-digit, zero-padded single-use credential a renter exchanges for an
/// account. The zero-padded decimal string is the only wire-visible format
/// contract of the core; it appears in emails and registration links.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccessToken(String);

impl AccessToken {
    pub const WIDTH: usize = 6;
    /// Number of distinct token values.
    pub const SPACE: u32 = 1_000_000;

    /// Format a raw sample into the canonical zero-padded representation.
    pub(crate) fn from_sample(value: u32) -> Self {
        Self(format!("{:06}", value % Self::SPACE))
    }

    /// Accept an inbound token string, rejecting anything that is not exactly
    /// six ASCII digits. A rejected string can never match a stored token.
    pub fn parse(value: &str) -> Option<Self> {
        let trimmed = value.trim();
        if trimmed.len() == Self::WIDTH && trimmed.bytes().all(|b| b.is_ascii_digit()) {
            Some(Self(trimmed.to_string()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The one status transition an invitation undergoes: pending → used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvitationStatus {
    Pending,
    Used,
}

impl InvitationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            InvitationStatus::Pending => "pending",
            InvitationStatus::Used => "used",
        }
    }
}

/// Persisted management company row. At most one exists per admin identity;
/// lookup is always by admin id and returns zero or one row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyRecord {
    pub id: CompanyId,
    pub admin_id: AdminId,
    pub name: String,
    pub contact_email: String,
}

/// Persisted building row, owned by a company.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildingRecord {
    pub id: BuildingId,
    pub company_id: CompanyId,
    pub name: String,
    pub postal_code: String,
}

/// Persisted unit row, owned by a building.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitRecord {
    pub id: UnitId,
    pub building_id: BuildingId,
    pub unit_number: String,
}

/// Persisted invitation row binding a renter's name and email to a unit and a
/// globally unique access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvitationRecord {
    pub id: InvitationId,
    pub unit_id: UnitId,
    pub renter_name: String,
    /// Case-insensitively unique within the owning unit.
    pub renter_email: String,
    pub token: AccessToken,
    pub status: InvitationStatus,
    pub created_at: DateTime<Utc>,
    pub activated_at: Option<DateTime<Utc>>,
}

/// Salted credential digest stored on a renter account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialHash {
    pub salt: String,
    pub digest: String,
}

/// Renter account created exactly once at redemption time. Lives
/// independently of the invitation that produced it; reconciliation and
/// cascading deletes never touch these rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenterRecord {
    pub id: RenterId,
    pub full_name: String,
    pub email: String,
    pub credentials: CredentialHash,
    pub company_id: CompanyId,
    /// Denormalized display names copied from the invitation's chain at
    /// redemption time; dashboard joins match on these, not on foreign keys.
    pub company_name: String,
    pub building_name: String,
    pub unit_number: String,
    pub created_at: DateTime<Utc>,
}

/// Full desired-state tree an admin submits in one save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortfolioDraft {
    pub company_name: String,
    pub contact_email: String,
    pub buildings: Vec<BuildingDraft>,
}

/// Desired building. A present `id` is an opaque key matched against the
/// owning company's existing rows; absence means "new".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildingDraft {
    pub id: Option<BuildingId>,
    pub name: String,
    pub postal_code: String,
    pub units: Vec<UnitDraft>,
}

/// Desired unit within a building.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitDraft {
    pub id: Option<UnitId>,
    pub unit_number: String,
    pub renters: Vec<RenterEntry>,
}

/// Desired renter slot within a unit. Invitations are matched by lowercased
/// email, never by the client-supplied id, which is carried only so clients
/// can round-trip their own row handles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenterEntry {
    pub id: Option<InvitationId>,
    pub full_name: String,
    pub email: String,
}

/// One rejected field of a submitted payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldIssue {
    pub field: &'static str,
    pub message: &'static str,
}

/// Field-level validation report raised before any transaction opens, so the
/// caller can fix the payload and resubmit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssues {
    pub issues: Vec<FieldIssue>,
}

impl fmt::Display for ValidationIssues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "portfolio payload failed validation")?;
        for (index, issue) in self.issues.iter().enumerate() {
            let sep = if index == 0 { ": " } else { "; " };
            write!(f, "{sep}{}: {}", issue.field, issue.message)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationIssues {}

/// Trim a user-supplied field, treating blank-after-trim values as absent.
pub(crate) fn normalized(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Canonical key for case-insensitive email matching.
pub(crate) fn email_key(value: &str) -> String {
    value.trim().to_lowercase()
}

static ID_SEQUENCE: AtomicU64 = AtomicU64::new(1);

/// Mint a process-unique row id. Real deployments get ids from the backing
/// store; the prefix keeps entity kinds recognizable in logs and fixtures.
pub(crate) fn mint_id(prefix: &str) -> String {
    let id = ID_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}-{id:06}")
}
