pub mod agents;
pub mod auth;
pub mod contacts;
pub mod dialer;
