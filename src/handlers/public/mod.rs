// handlers/public/mod.rs - Public handlers (no authentication required)
//
// Registration and token acquisition. These run against the default schema:
// no token means no tenant in the request context.
pub mod auth;
