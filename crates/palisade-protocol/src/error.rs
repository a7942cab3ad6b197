use thiserror::Error;

use palisade_binding::BindingError;
use palisade_guard::GuardError;
use palisade_store::StoreError;

/// Typed failures surfaced by the protocol layer.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error(transparent)]
    Guard(#[from] GuardError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Binding(#[from] BindingError),
}
