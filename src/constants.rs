pub(crate) const DEFAULT_TIMEOUT_MS: u64 = 2000;
pub(crate) const DEFAULT_BAUD_RATE: u32 = 9600;
pub(crate) const DEFAULT_READ_TERMINATION: &str = "\n";
pub(crate) const DEFAULT_WRITE_TERMINATION: &str = "\n";
pub(crate) const MAX_RESPONSE_SIZE: usize = 1024;

pub(crate) const DEFAULT_SEPARATOR: &str = ",";

/// Upper bound on `SYST:ERR?` reads before giving up on draining the queue
pub(crate) const ERROR_QUEUE_LIMIT: usize = 32;
