// Service configuration
pub mod config;

// Bearer token extraction for internal endpoints
pub mod auth;

// Per-user profile rows with encrypted Google tokens
pub mod profiles;

// Google OAuth2 and Classroom API boundary
pub mod google;

// Token refresh coordination and the authenticated call wrapper
pub mod tokens;

// HTTP API
pub mod api;
