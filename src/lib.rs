//! Library crate for pitchside-back, exposing the field presence and synchronization engine for
//! binaries and integration tests.

pub mod config;
pub mod dao;
mod dto;
pub mod error;
pub mod routes;
pub mod services;
pub mod state;
