//! # BuildTrace Common Library
//!
//! Shared code for the BuildTrace services including:
//! - Drawing model types and the change report
//! - Geometry helpers and the drawing diff engine
//! - JSON blob storage
//! - Configuration loading
//! - Utility functions

pub mod blob;
pub mod config;
pub mod diff;
pub mod drawing;
pub mod error;
pub mod geometry;
pub mod time;

pub use diff::{diff, DiffEngine};
pub use drawing::{ChangeReport, DrawingObject, DrawingVersion};
pub use error::{Error, Result};
