//! utilities crate for sluice
//!
//! `sluice-utils` contains the small building blocks shared by the
//! other sluice crates: declarative macros for wire enums, static
//! errors and builder setters, as well as time budget helpers.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![cfg_attr(not(test), warn(clippy::print_stdout, clippy::dbg_macro))]

#[doc(hidden)]
#[macro_use]
pub mod macros;

pub mod time;
