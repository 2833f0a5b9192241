//! Wait-status encoding. Spec §6.
//!
//! Nothing in the teacher repo encodes a wait status (it has no process
//! exit concept at all), so this is grounded directly on spec §6's
//! description of the encoding, written in the units/shift convention every
//! libc uses: low byte for termination cause, next byte for the exit code
//! when terminated normally.

/// Pack a normal-exit code into the wait-status word waitpid returns.
pub fn encode_exit_status(code: i32) -> i32 {
    (code & 0xff) << 8
}

/// Extract the exit code a normally-terminated process returned.
#[allow(non_snake_case)]
pub fn WEXITSTATUS(status: i32) -> i32 {
    (status >> 8) & 0xff
}

/// Whether `status` represents a normal exit. This crate has no signals, so
/// every encoded status is a normal exit; kept for symmetry with the
/// standard macro family and so callers don't have to special-case it away.
#[allow(non_snake_case)]
pub fn WIFEXITED(_status: i32) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_encode_and_decode() {
        for code in [0, 1, 42, 255] {
            let status = encode_exit_status(code);
            assert!(WIFEXITED(status));
            assert_eq!(WEXITSTATUS(status), code);
        }
    }

    #[test]
    fn code_is_masked_to_a_byte() {
        let status = encode_exit_status(0x1FF);
        assert_eq!(WEXITSTATUS(status), 0xFF);
    }
}
