pub mod outbound;
pub mod signature;
pub mod token;
pub mod twiml;
pub mod webhook;
