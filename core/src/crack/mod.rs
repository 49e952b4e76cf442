//! The cracking kernels executed by workers.
//!
//! Two pure entry points mirror the two task kinds: [`crack_hints`]
//! resolves hint hashes for one omitted character, [`crack_password`]
//! searches for one record's password over its reduced alphabet. Both are
//! free of actor state so they can be tested in isolation.

pub mod permutation;

use crate::cluster::messages::{CrackResult, PasswordOutcome};
use crate::cluster::types::Record;
use hashbreak_common::{ClusterError, Result, hash_hex};
use rayon::iter::{ParallelBridge, ParallelIterator};
use std::collections::{HashMap, HashSet};

pub use permutation::{CandidateStrings, HeapPermutations};

/// Resolve hints for one omitted character: hash every permutation of the
/// alphabet without `omitted` and collect the pairs whose digest appears
/// in the hint-hash set.
///
/// Permutations are generated lazily and hashed across the rayon pool;
/// match order is irrelevant since the result is a map.
pub fn crack_hints(
    alphabet: &[char],
    omitted: char,
    hint_hashes: &HashSet<String>,
) -> HashMap<String, String> {
    let rest: Vec<char> = alphabet.iter().copied().filter(|&c| c != omitted).collect();
    HeapPermutations::new(rest)
        .par_bridge()
        .filter_map(|permutation| {
            let digest = hash_hex(&permutation);
            hint_hashes.contains(&digest).then_some((digest, permutation))
        })
        .collect()
}

/// The single character present in the alphabet but absent from a cracked
/// hint plaintext.
///
/// Exactly one character must differ; zero or several differing characters
/// means the plaintext does not belong to this alphabet and is reported as
/// a contract violation rather than silently picking one.
pub fn missing_character(alphabet: &[char], plaintext: &str) -> Result<char> {
    let present: HashSet<char> = plaintext.chars().collect();
    let missing: Vec<char> = alphabet
        .iter()
        .copied()
        .filter(|c| !present.contains(c))
        .collect();
    match missing.as_slice() {
        [character] => Ok(*character),
        [] => Err(ClusterError::protocol_error(format!(
            "hint plaintext {plaintext:?} eliminates no character of the alphabet"
        ))),
        several => Err(ClusterError::protocol_error(format!(
            "hint plaintext {plaintext:?} eliminates {} characters",
            several.len()
        ))),
    }
}

/// The record's alphabet minus every character eliminated by its resolved
/// hints. Unresolved hints simply contribute nothing.
pub fn reduced_alphabet(record: &Record, cracked: &HashMap<String, String>) -> Result<Vec<char>> {
    let mut eliminated = HashSet::new();
    for hash in &record.hint_hashes {
        if let Some(plaintext) = cracked.get(hash) {
            eliminated.insert(missing_character(&record.alphabet, plaintext)?);
        }
    }
    Ok(record
        .alphabet
        .iter()
        .copied()
        .filter(|c| !eliminated.contains(c))
        .collect())
}

/// Search one record's password.
///
/// The reduced alphabet must not exceed `feasible_bound`, otherwise the
/// exhaustive search is never attempted and the record is reported
/// infeasible. Search order is deterministic, so the first digest match is
/// returned.
pub fn crack_password(
    record: &Record,
    cracked: &HashMap<String, String>,
    feasible_bound: usize,
) -> CrackResult {
    let outcome = match reduced_alphabet(record, cracked) {
        Err(e) => PasswordOutcome::Failed {
            reason: e.to_string(),
        },
        Ok(reduced) if reduced.len() > feasible_bound => PasswordOutcome::Infeasible {
            alphabet_size: reduced.len(),
        },
        Ok(reduced) => CandidateStrings::new(reduced, record.password_length)
            .find(|candidate| hash_hex(candidate) == record.password_hash)
            .map(|password| PasswordOutcome::Found { password })
            .unwrap_or(PasswordOutcome::NotFound),
    };
    CrackResult {
        record_id: record.id,
        name: record.name.clone(),
        outcome,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(alphabet: &str, length: usize, hash: &str, hints: Vec<String>) -> Record {
        Record {
            id: 1,
            name: "alice".into(),
            alphabet: alphabet.chars().collect(),
            password_length: length,
            password_hash: hash.into(),
            hint_hashes: hints,
        }
    }

    #[test]
    fn test_crack_hints_finds_all_matching_permutations() {
        let alphabet: Vec<char> = "abcd".chars().collect();
        // Two hints omitting 'd', one omitting 'a'; only the first two can
        // be found when 'd' is the omitted character.
        let hints: HashSet<String> =
            [hash_hex("abc"), hash_hex("cba"), hash_hex("bcd")].into();

        let cracked = crack_hints(&alphabet, 'd', &hints);
        assert_eq!(cracked.len(), 2);
        assert_eq!(cracked.get(&hash_hex("abc")).unwrap(), "abc");
        assert_eq!(cracked.get(&hash_hex("cba")).unwrap(), "cba");
    }

    #[test]
    fn test_crack_hints_with_no_matches_is_empty() {
        let alphabet: Vec<char> = "abc".chars().collect();
        let hints: HashSet<String> = [hash_hex("zzz")].into();
        assert!(crack_hints(&alphabet, 'c', &hints).is_empty());
    }

    #[test]
    fn test_missing_character_contract() {
        let alphabet: Vec<char> = "abcd".chars().collect();
        assert_eq!(missing_character(&alphabet, "abc").unwrap(), 'd');
        assert_eq!(missing_character(&alphabet, "cba").unwrap(), 'd');

        // Zero differences and several differences are both violations.
        assert!(missing_character(&alphabet, "abcd").is_err());
        assert!(missing_character(&alphabet, "ab").is_err());
    }

    #[test]
    fn test_crack_password_reference_scenario() {
        // Alphabet "abcd", length 3, target SHA-256("abc"); one resolved
        // hint eliminates 'd', bringing the reduced alphabet to the bound.
        let hint_hash = hash_hex("bca");
        let record = record("abcd", 3, &hash_hex("abc"), vec![hint_hash.clone()]);
        let cracked = HashMap::from([(hint_hash, "bca".to_string())]);

        let result = crack_password(&record, &cracked, 3);
        assert_eq!(
            result.outcome,
            PasswordOutcome::Found {
                password: "abc".into()
            }
        );
    }

    #[test]
    fn test_crack_password_infeasible_above_bound() {
        // Nothing resolved: the reduced alphabet stays at size 5, above
        // the bound of 3, so the search must never be attempted.
        let record = record("abcde", 3, &hash_hex("abc"), vec![hash_hex("bcde")]);
        let result = crack_password(&record, &HashMap::new(), 3);
        assert_eq!(
            result.outcome,
            PasswordOutcome::Infeasible { alphabet_size: 5 }
        );
    }

    #[test]
    fn test_crack_password_not_found() {
        let hint_hash = hash_hex("bca");
        let record = record("abcd", 2, &hash_hex("zzz"), vec![hint_hash.clone()]);
        let cracked = HashMap::from([(hint_hash, "bca".to_string())]);
        let result = crack_password(&record, &cracked, 3);
        assert_eq!(result.outcome, PasswordOutcome::NotFound);
    }

    #[test]
    fn test_crack_password_reports_malformed_hint_as_failure() {
        let hint_hash = hash_hex("xy");
        let record = record("abcd", 2, &hash_hex("aa"), vec![hint_hash.clone()]);
        // Plaintext from a different alphabet: two characters differ.
        let cracked = HashMap::from([(hint_hash, "xy".to_string())]);
        let result = crack_password(&record, &cracked, 3);
        assert!(matches!(result.outcome, PasswordOutcome::Failed { .. }));
    }
}
