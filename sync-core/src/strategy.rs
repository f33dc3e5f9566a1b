//! Copy strategy selection.

use sync_types::{AccountId, CopyStrategy};

/// Largest object a single server-side copy operation accepts (5 GiB).
pub const MAX_COPY_SIZE: u64 = 5 * 1024 * 1024 * 1024;

/// Choose between a server-side copy and a stream-through copy.
///
/// Express requires both that the two sides authenticate as the same account
/// and that the object fits in one copy operation. Everything else streams.
///
/// The size ceiling is only ever consulted together with the account match:
/// cross-account copies stream regardless of size, and same-account copies
/// stream once they exceed [`MAX_COPY_SIZE`].
pub fn choose_strategy(source: &AccountId, dest: &AccountId, size: u64) -> CopyStrategy {
    if source == dest && size <= MAX_COPY_SIZE {
        CopyStrategy::Express
    } else {
        CopyStrategy::Stream
    }
}
