//! Carrying an open transaction through a request [`Context`].
//!
//! Code that wants several executor calls to run in one transaction begins
//! it once, derives a context with [`with_transaction`] and passes that
//! context down. The executor picks the handle up with [`transaction_of`].

use crate::context::Context;

/// Private slot key. Being a type rather than a string, no other module can
/// read or overwrite the slot by accident.
struct TxKey;

/// Derive a context carrying `tx`. The parent context is left untouched.
pub fn with_transaction<T>(ctx: &Context, tx: T) -> Context
where
    T: Clone + Send + Sync + 'static,
{
    ctx.with_value::<TxKey, T>(tx)
}

/// The transaction carried by `ctx`, if there is one of type `T`.
pub fn transaction_of<T>(ctx: &Context) -> Option<T>
where
    T: Clone + 'static,
{
    ctx.value::<TxKey, T>().cloned()
}
