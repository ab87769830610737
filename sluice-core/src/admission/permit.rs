use super::Ticket;
use super::controller::AdmissionShared;
use std::fmt;
use std::sync::Arc;

#[must_use = "dropping a permit releases its admission slot"]
/// Proof that a connection attempt holds one admission slot.
///
/// The slot is released exactly once: either explicitly via
/// [`AdmissionPermit::release`] or when the permit is dropped.
pub struct AdmissionPermit {
    shared: Option<Arc<AdmissionShared>>,
    ticket: Ticket,
}

impl AdmissionPermit {
    pub(super) fn new(shared: Arc<AdmissionShared>, ticket: Ticket) -> Self {
        Self {
            shared: Some(shared),
            ticket,
        }
    }

    /// The ticket of the request this permit was granted to.
    #[must_use]
    pub fn ticket(&self) -> Ticket {
        self.ticket
    }

    /// Release the slot held by this permit.
    pub fn release(mut self) {
        self.release_slot();
    }

    fn release_slot(&mut self) {
        if let Some(shared) = self.shared.take() {
            shared.release(self.ticket);
        }
    }
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        self.release_slot();
    }
}

impl fmt::Debug for AdmissionPermit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdmissionPermit")
            .field("ticket", &self.ticket)
            .field("released", &self.shared.is_none())
            .finish()
    }
}
