//! Build cache controller for Kiln.
//!
//! Decides whether a module's build steps can be skipped by restoring a
//! previous build from the remote or local tier, and records fresh builds.

pub mod archiver;
pub mod checksum;
pub mod controller;
pub mod diff;
pub mod hashing;
pub mod keys;
pub mod policy;
mod restore;
mod save;
pub mod segment;
pub mod store;

pub use checksum::FileTreeChecksum;
pub use controller::{CacheController, NoScm, merge_tier_results};
pub use diff::{BuildDiff, CacheDiff, Mismatch, MismatchContext};
pub use hashing::{Sha256HashFactory, Sha256Hasher, Sha512HashFactory, Sha512Hasher, hash_factory_for};
pub use policy::{CachePolicy, PropertyRules, should_record_property};
pub use store::{BUILD_INFO_FILE, DirectoryRemote, FilesystemStore};
