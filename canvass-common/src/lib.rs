//! # Canvass Common Library
//!
//! Shared code for the canvass submission services:
//! - Submission data model (operators, locality, coordinates, sync markers)
//! - Submission Store (SQLite-backed, transactional writes, marker updates, claims)
//! - Bootstrap configuration loading
//! - Time formatting helpers

pub mod config;
pub mod db;
pub mod error;
pub mod locality;
pub mod time;

pub use db::{
    CoverageState, Lease, MirrorSheet, NewSubmission, OperatorSet, PhotoReference, Submission,
    SubmissionStore, SyncMarkers, FS_OPERATOR, MAX_PHOTOS,
};
pub use error::{Error, Result};
pub use locality::{Coordinates, Locality};
