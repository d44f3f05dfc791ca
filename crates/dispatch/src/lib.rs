//! Notification dispatch: recipient resolution, the delivery ledger, and the
//! orchestrator that drives each recipient from `Pending` to `Sent`/`Failed`.

pub mod audit;
pub mod ledger;
pub mod orchestrator;
pub mod resolver;
pub mod service;
pub mod throttle;

#[cfg(test)]
mod testing;
