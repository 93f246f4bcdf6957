//! Archive plumbing for the embeddable distribution layout: extraction of
//! the upstream zip (including the nested standard-library archive) and
//! deterministic repacking of a finished working tree.

mod extract;
mod pack;

pub use extract::{ArchiveError, extract_distribution};
pub use pack::pack_tree;
