use serde::{Deserialize, Serialize};
use tracing::info;

use super::domain::AccessToken;

/// Payload handed to the outbound email collaborator for each freshly created
/// invitation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvitationEmail {
    pub renter_name: String,
    pub renter_email: String,
    pub company_name: String,
    pub building_name: String,
    pub unit_number: String,
    pub token: AccessToken,
}

/// Outbound invitation delivery seam. Delivery is fire-and-forget: the
/// reconciliation that created the invitation has already committed by the
/// time this runs, and a failed send never unwinds it.
pub trait InvitationMailer: Send + Sync {
    fn send_invitation(&self, email: &InvitationEmail) -> Result<(), MailerError>;
}

/// Mail dispatch error.
#[derive(Debug, thiserror::Error)]
pub enum MailerError {
    #[error("mail transport unavailable: {0}")]
    Transport(String),
}

/// Stand-in transport that records the would-be send in the log stream,
/// including the registration link a real template would carry.
pub struct LogMailer {
    registration_base_url: String,
}

impl LogMailer {
    pub fn new(registration_base_url: impl Into<String>) -> Self {
        Self {
            registration_base_url: registration_base_url.into(),
        }
    }
}

impl InvitationMailer for LogMailer {
    fn send_invitation(&self, email: &InvitationEmail) -> Result<(), MailerError> {
        info!(
            renter = %email.renter_email,
            building = %email.building_name,
            unit = %email.unit_number,
            registration_url = %format!("{}?token={}", self.registration_base_url, email.token),
            "invitation email dispatched"
        );
        Ok(())
    }
}
