//! Perimeter - policy-constraint enforcement engine
//!
//! Decides whether a subject may perform an action on a set of resources, combining
//! role-bound policies resolved through a relationship graph with process-wide system
//! policies. Deny policies win over allow policies; anything not allowed is denied.

pub mod access;
pub mod entities;
pub mod errors;
pub mod settings;
pub mod storage;
