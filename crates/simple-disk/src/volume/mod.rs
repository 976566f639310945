//! The volume engine: classifying disks, recruiting blank ones and matching
//! initialized ones against queries.

pub mod access;
pub mod candidates;
pub mod label;
pub mod matcher;
pub mod setup;

pub use access::VolumeAccess;
pub use candidates::{candidates, classify, DiskCandidates, DiskState, RejectReason};
pub use label::VolumeLabel;
pub use matcher::query_matches;
pub use setup::initialize;
