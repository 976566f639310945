//! Host-local block-storage volume manager.
//!
//! Brokers raw disks to a container runtime as named, labelled volumes:
//! candidate disks are discovered through the udev database with
//! operator-supplied selection rules, classified as initialized, blank or
//! off-limits, recruited by partitioning them with a metadata label (and
//! optionally an encrypted data volume), and matched against declarative
//! volume queries on every mount request.

pub mod constants;
pub mod device;
pub mod error;
pub mod mounts;
pub mod query;
pub mod tools;
pub mod volume;
pub mod volumelabel;

#[cfg(test)]
pub(crate) mod testutils;
