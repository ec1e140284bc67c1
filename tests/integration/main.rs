//! Integration tests: full placement → event → settlement → stats flows
//! against the real stores.

mod concurrency;
mod faulty_store;
mod fixtures;
mod settlement_flow;
