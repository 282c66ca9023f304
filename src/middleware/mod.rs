//! Ambient HTTP middleware: route-table-driven encryption (spec.md §4.F,
//! §4.G) and token-bucket rate limiting (§4.L, out-of-core but carried as
//! part of the ambient stack per `SPEC_FULL.md`).

pub mod crypto;
pub mod rate_limit;
pub mod routing;
