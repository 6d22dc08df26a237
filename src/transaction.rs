//! Transaction ownership for the persistence engine.
//!
//! A write either opens its own transaction ([`TxScope::Owned`]) and must end
//! it exactly once, or runs inside a caller's transaction
//! ([`TxScope::Borrowed`]) and must leave it alone. Both end through
//! [`TxScope::finish`].

use hatchify_core::Transaction;
use hatchify_core::error::HatchifyError;

use crate::engine::store_error;

#[derive(Debug)]
pub enum TxScope<'t, T: Transaction> {
    /// Opened by this write; committed or rolled back by [`TxScope::finish`]
    Owned(T),
    /// Supplied by the caller, who commits or rolls it back
    Borrowed(&'t T),
}

impl<'t, T: Transaction> TxScope<'t, T> {
    pub fn executor(&self) -> &T {
        match self {
            TxScope::Owned(tx) => tx,
            TxScope::Borrowed(tx) => tx,
        }
    }

    /// Ends the scope with the outcome of the work done inside it.
    ///
    /// An owned transaction commits on `Ok` and rolls back on `Err`; the
    /// original error is returned even if the rollback itself fails. A
    /// borrowed transaction passes `result` through untouched.
    pub async fn finish<R>(self, result: Result<R, HatchifyError>) -> Result<R, HatchifyError> {
        let TxScope::Owned(tx) = self else {
            return result;
        };

        match result {
            Ok(value) => {
                tx.commit().await.map_err(store_error)?;
                Ok(value)
            }
            Err(err) => {
                if let Err(_rollback) = tx.rollback().await {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(error = %_rollback, "hatchify.rollback_failed");
                }
                Err(err)
            }
        }
    }
}
