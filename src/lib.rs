//! Color Variant Job Service
//!
//! This library provides the core functionality for the color-variants
//! system, which accepts an uploaded image, asks an external inference
//! service for seven color variants of it, and exposes the evolving outcome
//! through a pollable job record.

pub mod app_state;
pub mod config;
pub mod models;
pub mod routes;
pub mod services;
