use thiserror::Error;

/// Errors reported by the controller. Every rejection here happens before
/// any instruction reaches the device, so a failed call leaves the array
/// untouched.
#[derive(Error, Debug, PartialEq)]
pub enum RaidError {
    #[error("array is not mounted")]
    NotMounted,
    #[error("array is already mounted")]
    AlreadyMounted,
    #[error("write permission has not been granted")]
    PermissionDenied,
    #[error("request of {0} bytes exceeds the maximum transfer size")]
    RequestTooLarge(usize),
    #[error("address range ending at {0} exceeds array capacity")]
    OutOfBounds(usize),
    #[error("a block cache is already attached")]
    CacheExists,
    #[error("no block cache is attached")]
    NoCache,
    #[error("cache capacity {0} is outside the supported range")]
    InvalidCapacity(usize),
    #[error("disk {disk} block {block} is outside the array geometry")]
    InvalidAddress { disk: usize, block: usize },
    #[error("disk {disk} block {block} is already cached")]
    DuplicateEntry { disk: usize, block: usize },
}

pub type Result<T> = std::result::Result<T, RaidError>;
