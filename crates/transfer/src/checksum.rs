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

use sha2::{Digest, Sha256};

/// Computes SHA-256 of `data` and returns the lowercase hex digest.
#[must_use]
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Returns true if `expected` is the hex SHA-256 digest of `data`.
///
/// Uppercase hex is accepted; an empty digest never matches.
#[must_use]
pub fn verify_checksum(data: &[u8], expected: &str) -> bool {
    !expected.is_empty() && sha256_hex(data).eq_ignore_ascii_case(expected)
}
