// handlers/mod.rs - Two-tier handler layout
//
// Public (no identity required) and Protected (verified tenant identity).
// Both tiers run inside the tenant boundary; only protected routes insist
// on an identity being present.
pub mod protected;
pub mod public;
