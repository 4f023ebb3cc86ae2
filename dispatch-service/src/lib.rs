pub mod api;
pub mod gateway;
pub mod hub;
pub mod router;
pub mod store;
pub mod ws;
