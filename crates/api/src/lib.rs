//! CivicNotify operator API.
//!
//! Endpoints:
//! - GET  /health
//! - POST /api/notifications/preview: resolve a criterion without sending
//! - POST /api/notifications/send: bulk send to a criterion
//! - POST /api/notifications/send-individual: send to one entity or phone
//! - GET  /api/notifications/{id}: one ledger row
//! - POST /api/notifications/{id}/read: mark a delivered row read
//! - GET  /api/recipients/{type}/{id}/notifications: recipient history

pub mod middleware;
pub mod routes;
pub mod state;
