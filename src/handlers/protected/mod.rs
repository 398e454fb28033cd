// handlers/protected/mod.rs - Protected handlers (verified tenant identity required)
//
// Route prefix /api/*. The tenant boundary has already bound the request
// context from the token by the time these run.
pub mod auth;
pub mod tenant;
