//! Order lifecycle subsystem for a farming marketplace.
//!
//! Local status changes are gated by a transition policy, applied
//! optimistically, and reconciled with the marketplace backend.

pub mod api;
pub mod config;
pub mod domain;
pub mod lifecycle;
pub mod notification;
pub mod storage;
pub mod sync;

#[cfg(test)]
mod fixtures;
