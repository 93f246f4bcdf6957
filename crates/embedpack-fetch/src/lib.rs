//! Remote asset handling: the on-disk download cache and the package-index
//! listing scrape used to resolve wheel files.

mod cache;
mod index;

pub use cache::{AssetCache, FetchError};
pub use index::{IndexError, WheelRef, parse_wheel_listing, resolve_latest_wheel};
