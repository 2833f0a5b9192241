//! Console logging.
//!
//! Borrowed in shape from the teacher kernel's serial-port `Debug` writer:
//! a zero-sized `Write` implementor plumbed through a `printk!` macro. The
//! actual byte sink is hardware (a serial port, in a real kernel) and is
//! therefore out of scope here; in production builds `Logger` is a no-op,
//! and under `cfg(test)` it forwards to stdout so test failures are still
//! legible.

use core::fmt::{Error, Write};

/// Writes formatted log lines. Hooked up to real hardware by the boot glue
/// this crate does not implement.
pub struct Logger;

impl Write for Logger {
    #[inline]
    fn write_str(&mut self, _data: &str) -> Result<(), Error> {
        #[cfg(test)]
        std::print!("{}", _data);
        Ok(())
    }
}

/// Print a formatted line to the kernel console.
#[macro_export]
macro_rules! printk {
    ($($arg:tt)*) => ({
        use core::fmt::Write;
        let _ = write!($crate::debug::Logger, $($arg)*);
    })
}
