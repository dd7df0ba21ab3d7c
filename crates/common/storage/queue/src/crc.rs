// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Payload checksum.
//!
//! CRC-32 (IEEE polynomial) via crc32fast, seeded with all ones and stored
//! without the final inversion. Entries on flash written by existing devices
//! carry this exact value: the bitwise complement of the standard CRC-32.

use crc32fast::Hasher;

/// Initial register value.
pub const CRC_SEED: u32 = 0xFFFF_FFFF;

/// Folds `data` into a running register. Feed the result back in to continue.
#[inline]
#[must_use]
pub fn crc32_update(crc: u32, data: &[u8]) -> u32 {
    // Hasher keeps the finalized form, the complement of the raw register.
    let mut hasher = Hasher::new_with_initial(!crc);
    hasher.update(data);
    !hasher.finalize()
}

/// Checksum stored after an entry's payload.
#[inline]
#[must_use]
pub fn payload_crc(data: &[u8]) -> u32 { crc32_update(CRC_SEED, data) }

/// Verifies a payload against its stored checksum.
#[inline]
#[must_use]
pub fn verify_payload_crc(data: &[u8], expected: u32) -> bool { payload_crc(data) == expected }

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    /// Bitwise register form of the table-driven algorithm used on devices.
    fn reference_crc(mut crc: u32, data: &[u8]) -> u32 {
        for &byte in data {
            crc ^= u32::from(byte);
            for _ in 0..8 {
                crc = if crc & 1 == 1 {
                    (crc >> 1) ^ 0xEDB8_8320
                } else {
                    crc >> 1
                };
            }
        }
        crc
    }

    #[test]
    fn test_empty_payload_is_seed() {
        assert_eq!(payload_crc(&[]), CRC_SEED);
    }

    #[test]
    fn test_check_value() {
        // Standard CRC-32 check value for "123456789" is 0xCBF43926.
        assert_eq!(payload_crc(b"123456789"), !0xCBF4_3926);
    }

    #[test]
    fn test_complement_of_standard_crc32() {
        let samples: [&[u8]; 4] = [b"a", b"test message", &[0u8; 64], &[0xFFu8; 3]];
        for data in samples {
            assert_eq!(payload_crc(data), !crc32fast::hash(data));
        }
    }

    #[test_case(CRC_SEED ; "standard seed")]
    #[test_case(0 ; "zero seed")]
    #[test_case(0x1234_5678 ; "arbitrary seed")]
    #[test_case(0xDEAD_BEEF ; "running register")]
    fn test_update_matches_register_algorithm(seed: u32) {
        let inputs: [&[u8]; 4] = [b"", b"a", b"123456789", &[0xA5u8; 300]];
        for data in inputs {
            assert_eq!(crc32_update(seed, data), reference_crc(seed, data));
        }
    }

    #[test]
    fn test_incremental_update() {
        let data = b"incremental checksum input";
        let (head, tail) = data.split_at(10);
        let crc = crc32_update(crc32_update(CRC_SEED, head), tail);
        assert_eq!(crc, payload_crc(data));
    }

    #[test]
    fn test_verify_payload_crc() {
        let data = b"message to verify";
        let crc = payload_crc(data);

        assert!(verify_payload_crc(data, crc));
        assert!(!verify_payload_crc(data, crc.wrapping_add(1)));
        assert!(!verify_payload_crc(b"wrong", crc));
    }
}
