//! Model adapters.
//!
//! The separation and alignment models are external programs. This module
//! defines the blocking [`Separator`] and [`Aligner`] seams and the
//! process-spawning implementations used in production. Test doubles live in
//! [`crate::testing`].

mod command;
mod error;
mod traits;

pub use command::{order_by_stem_labels, CommandAligner, CommandSeparator};
pub use error::ModelError;
pub use traits::{Aligner, Separator};
