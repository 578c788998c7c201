//! Tensor views consumed by the descriptor layer
//!
//! Storage allocation lives with the caller. This module only describes
//! memory that already exists: its layout and a raw device address.

mod layout;
mod view;

pub use layout::{Layout, Shape, Strides};
pub use view::{CompressedView, DenseView, SparseFormat};

pub(crate) use view::buffer_batch_count;
