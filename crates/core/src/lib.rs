//! Core business rules for Tally.
//!
//! This crate contains pure business logic with ZERO database dependencies.
//! All domain types, validation rules, and calculations live here.
//!
//! # Modules
//!
//! - `auth` - Password records, verification outcomes, roles
//! - `audit` - Audit actions, soft-delete tables, history replay
//! - `inventory` - Movement signing, stock rules, reconciliation
//! - `pricing` - Tax and surcharge over an explicit config snapshot

pub mod audit;
pub mod auth;
pub mod inventory;
pub mod pricing;
