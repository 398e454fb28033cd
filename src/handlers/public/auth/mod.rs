// handlers/public/auth/mod.rs - Public authentication handlers

pub mod login; // POST /auth/login - verify credentials, issue tenant token
pub mod register; // POST /auth/register - onboard a new tenant

pub use login::login_post;
pub use register::register_post;
