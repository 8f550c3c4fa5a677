//! Core data types for Y-STR profile matching.
//!
//! This module provides the fundamental types used throughout the library:
//!
//! - [`KitId`](types::KitId): Stable identifier of a profile
//! - [`Profile`](profile::Profile): A kit with its metadata and marker readings
//! - [`MarkerMap`](marker::MarkerMap) / [`MarkerValue`](marker::MarkerValue): Raw and parsed marker readings
//! - [`PanelSize`](panel::PanelSize) / [`MarkerPanels`](panel::MarkerPanels): Standard nested marker panels
//! - [`ErrorKind`](types::ErrorKind): Stable error classification
//!
//! ## Marker values
//!
//! | Form | Example | Meaning |
//! |------|---------|---------|
//! | Single | `13` | One repeat count |
//! | Intermediate | `9.3` | Partial repeat |
//! | Multi-copy | `11-14`, `15-15-16-17` | Copies of a duplicated locus |
//!
//! Values must match `^[0-9]+(\.[0-9]+)?(-[0-9]+(\.[0-9]+)?)*$`; empty values,
//! all-zero readings and a lone dash are rejected.

pub mod marker;
pub mod panel;
pub mod profile;
pub mod types;
