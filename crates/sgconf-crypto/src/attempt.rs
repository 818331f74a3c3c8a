//! "Try all candidates" combinators
//!
//! Candidates run in parallel on the rayon pool. The winner of
//! [`first_success`] is the first success in *candidate order*, not the
//! first to finish, so results do not depend on scheduling.

use rayon::prelude::*;
use tracing::trace;

use crate::error::{CryptoError, CryptoResult};

/// Return the first candidate (in order) for which `attempt` succeeds.
/// Fails with [`CryptoError::AllCandidatesFailed`] when none does.
pub fn first_success<C, T, E, F>(candidates: Vec<C>, attempt: F) -> CryptoResult<T>
where
    C: Send,
    T: Send,
    E: std::fmt::Display,
    F: Fn(C) -> Result<T, E> + Sync + Send,
{
    let attempts = candidates.len();
    candidates
        .into_par_iter()
        .enumerate()
        .find_map_first(|(idx, candidate)| match attempt(candidate) {
            Ok(value) => Some(value),
            Err(e) => {
                trace!(candidate = idx, error = %e, "candidate rejected");
                None
            }
        })
        .ok_or(CryptoError::AllCandidatesFailed { attempts })
}

/// Collect every success, in candidate order. Individual failures are
/// dropped silently; an empty result is not an error.
pub fn all_successes<C, T, E, F>(candidates: Vec<C>, attempt: F) -> Vec<T>
where
    C: Send,
    T: Send,
    E: std::fmt::Display,
    F: Fn(C) -> Result<T, E> + Sync + Send,
{
    candidates
        .into_par_iter()
        .filter_map(|candidate| attempt(candidate).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_even(n: u32) -> Result<u32, String> {
        if n % 2 == 0 {
            Ok(n)
        } else {
            Err(format!("{n} is odd"))
        }
    }

    #[test]
    fn test_first_success_is_first_in_order() {
        let result = first_success(vec![1, 3, 4, 5, 6, 8], parse_even).unwrap();
        assert_eq!(result, 4);
    }

    #[test]
    fn test_first_success_deterministic_under_load() {
        let candidates: Vec<u32> = (1..1000).collect();
        for _ in 0..20 {
            assert_eq!(first_success(candidates.clone(), parse_even).unwrap(), 2);
        }
    }

    #[test]
    fn test_first_success_all_fail() {
        let result = first_success(vec![1, 3, 5], parse_even);
        assert!(matches!(result, Err(CryptoError::AllCandidatesFailed { attempts: 3 })));
    }

    #[test]
    fn test_first_success_empty() {
        let result = first_success(Vec::<u32>::new(), parse_even);
        assert!(matches!(result, Err(CryptoError::AllCandidatesFailed { attempts: 0 })));
    }

    #[test]
    fn test_all_successes_preserves_order() {
        assert_eq!(all_successes(vec![6, 1, 2, 3, 4], parse_even), vec![6, 2, 4]);
        assert!(all_successes(vec![1, 3], parse_even).is_empty());
    }
}
