//! Request reconciliation
//!
//! Every display query is tagged with a fresh, strictly increasing id.
//! Only a response carrying the latest id is applied; anything older was
//! superseded while in flight and is dropped.

/// Identifier of an issued display query
pub type RequestId = u64;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestReconciler {
    latest: RequestId,
}

impl RequestReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// The id of the most recently issued query (0 before any)
    pub fn latest(&self) -> RequestId {
        self.latest
    }

    /// Issue the next id
    pub fn issue(&mut self) -> RequestId {
        self.latest += 1;
        self.latest
    }

    /// Whether a response tagged `id` may be applied
    pub fn accepts(&self, id: RequestId) -> bool {
        let accepted = id == self.latest;
        if !accepted {
            tracing::warn!(request_id = id, latest = self.latest, "dropping stale response");
        }
        accepted
    }
}
