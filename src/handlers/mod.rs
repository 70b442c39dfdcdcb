// handlers/mod.rs - Handlers grouped by security tier
//
// Public (no auth) → Protected (JWT auth, caller passed explicitly to the engine)
pub mod public;
pub mod protected;
