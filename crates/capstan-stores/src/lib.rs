//! Capstan Stores - external service adapters for the release pipeline
//!
//! Two collaborators live here:
//! - [`notary`]: submits disk images to the Apple notarization service,
//!   blocks for the verdict, staples and validates the ticket.
//! - [`github`]: attaches signed artifacts to a GitHub release record with
//!   idempotent same-name replacement, and flips the release public behind
//!   an all-assets-present barrier.

pub mod error;
pub mod github;
pub mod notary;

pub use error::{Result, StoreError};
pub use github::{Release, ReleaseAsset, ReleaseClient};
pub use notary::Notarizer;
