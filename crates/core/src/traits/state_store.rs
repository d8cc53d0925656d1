//! Per-identity state store.
//!
//! Governance state (rate windows, cost ledgers) is keyed by caller identity.
//! Stores are injected into the components that own the state so they can be
//! swapped for tests or for an external backend.

/// Mutable per-identity records with exclusive access per identity.
///
/// Implementations must serialize `with_record` calls for the same identity
/// so that read-modify-write sequences never lose updates. Calls for
/// different identities may run in parallel.
pub trait IdentityStore<R>: Send + Sync {
    /// Run `f` with exclusive access to the identity's record, creating it
    /// with `R::default()` when absent.
    fn with_record(&self, identity: &str, f: &mut dyn FnMut(&mut R));

    /// Run `f` with shared access to the identity's record, if any.
    fn inspect(&self, identity: &str, f: &mut dyn FnMut(Option<&R>));

    /// Keep only the records for which `keep` returns true. `keep` may
    /// modify a record before deciding.
    fn retain(&self, keep: &mut dyn FnMut(&mut R) -> bool);

    /// Drop every record.
    fn clear(&self);

    /// Number of identities with a record.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
