//! Application services: form control, backend access, rendering and export.

pub mod client;
pub mod controller;
pub mod error;
pub mod export;
pub mod render;
pub mod report;
pub mod session;
pub mod stream;
