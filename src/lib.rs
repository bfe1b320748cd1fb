//! Policy Store - relational storage for pattern-based access-control policies
//!
//! Policies name their subjects, actions and resources as literal strings or
//! as templates with delimited regular expressions. Every distinct template is
//! stored once and shared between policies, and candidate lookups for a
//! request are answered by the database engine.

pub mod entities;
pub mod errors;
pub mod manager;
pub mod policy;
pub mod settings;
pub mod storage;

pub use errors::StoreError;
pub use manager::{PolicyManager, SqlPolicyManager};
pub use policy::{Effect, Policy, Request};
pub use settings::Settings;
