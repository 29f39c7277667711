//! Error types for the language intelligence service.
//!
//! Data-dependent failures (unknown URI, unresolved name) are not errors:
//! queries return empty results for those.  The variants here cover
//! lifecycle misuse and structural contract violations.  Duplicate opens
//! surface to the protocol layer; scope and branch underflows are raised
//! by the variable table, recorded by the flow pass, and logged at the
//! service façade, which aborts the request with an empty result and
//! leaves the table's last consistent state untouched; a busy store
//! fails its queries fast instead of returning stale data.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// A document with this URI is already open in the registry.
    #[error("document '{uri}' is already open")]
    DuplicateDocument { uri: String },

    /// `popScope` was called on a variable table with no pushed scope.
    #[error("variable table scope underflow")]
    ScopeUnderflow,

    /// `popBranch` would remove the base branch of the active scope.
    #[error("variable table branch underflow")]
    BranchUnderflow,

    /// A symbol store query arrived while the store was being mutated.
    #[error("symbol store is busy (re-entrant access during mutation)")]
    StoreBusy,
}
