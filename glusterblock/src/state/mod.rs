//! Volume state store.
//!
//! Every [`BlockVolume`] is kept in a single JSON file under the driver
//! root, rewritten atomically after each successful mutating operation and
//! loaded once at startup.

mod store;
mod volume;

pub use store::{StateStore, VolumeMap};
pub use volume::BlockVolume;
