//! Contract bindings for the events the tracker decodes.
//!
//! Only the Across Protocol SpokePool is bound here. The tracker never sends
//! transactions, so the bindings carry event definitions and no `rpc` helpers.
//!
//! All bindings are generated using alloy's `sol!` macro.

pub mod across;

pub use across::ISpokePool;
