//! Domain types shared across Parley services.
//!
//! This crate contains only pure types with no framework dependencies.
//! Import in `usecase/` and `domain/` layers; never in `infra/`.

pub mod email;
pub mod registration;
pub mod site;
