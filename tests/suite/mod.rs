//! Integration test modules

mod history;
mod session;
