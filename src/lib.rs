//! Marketkit - marketing images for property listings
//!
//! Binds listing data into a fixed catalog of templates, renders them to
//! SVG and rasterizes the result for download or sharing.
//! This library exposes modules for integration testing.

pub mod api;
pub mod assets;
pub mod error;
pub mod models;
pub mod rendering;
pub mod server;
pub mod services;
