//! bazi-coach: birth form, report rendering and export for a BaZi report backend.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
pub mod presentation;
pub mod util;
