use crate::domain::repository::CodeGenerator;
use crate::error::CodeError;

/// Verification-code alphabet (mixed-case alphanumeric, 62 symbols).
const CODE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// 24 symbols over a 62-symbol alphabet ≈ 143 bits of entropy.
const CODE_LEN: usize = 24;

// Largest multiple of 62 that fits in a byte; bytes at or above it are
// resampled, keeping `byte % 62` uniform.
const REJECT_AT: u8 = 248;

/// Code generator reading the OS entropy source directly, so an unavailable
/// source surfaces as an error instead of a panic.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsCodeGenerator;

impl CodeGenerator for OsCodeGenerator {
    fn generate(&self) -> Result<String, CodeError> {
        let mut code = String::with_capacity(CODE_LEN);
        let mut buf = [0u8; 64];
        while code.len() < CODE_LEN {
            getrandom::getrandom(&mut buf).map_err(|_| CodeError::EntropySourceUnavailable)?;
            for &byte in &buf {
                if byte < REJECT_AT {
                    code.push(CODE_CHARSET[(byte % 62) as usize] as char);
                    if code.len() == CODE_LEN {
                        break;
                    }
                }
            }
        }
        Ok(code)
    }
}
