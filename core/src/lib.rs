//! Shared guard core for Mirador services.
//!
//! Everything a guarded tool invocation needs: request-scoped job
//! correlation ([`job`]), an append-only best-effort audit trail
//! ([`audit`]), the closed failure taxonomy and envelope builders
//! ([`error`]), input validators ([`validate`]), and the combinator that
//! composes them around a tool body ([`guard`]).

pub mod audit;
pub mod error;
pub mod guard;
pub mod job;
pub mod validate;
