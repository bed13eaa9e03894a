//! Materialized path codec
//!
//! Paths are stored as decimal ancestor ids joined by `.`, root first:
//! `[1, 2]` <-> `"1.2"`, a root has the empty path `""`.
//! Only the delimiter separates elements, so `"12"` is always the single id 12.

use itertools::Itertools;

use crate::domain::entities::PointId;
use crate::domain::error::{DomainError, DomainResult};

pub const DELIMITER: char = '.';

/// Encode an ordered ancestor sequence.
pub fn encode(ancestors: &[PointId]) -> String {
    ancestors.iter().join(".")
}

/// Decode an encoded path back into the ordered ancestor sequence.
pub fn decode(raw: &str) -> DomainResult<Vec<PointId>> {
    if raw.is_empty() {
        return Ok(Vec::new());
    }
    raw.split(DELIMITER)
        .map(|segment| parse_segment(raw, segment))
        .collect()
}

fn parse_segment(raw: &str, segment: &str) -> DomainResult<PointId> {
    if segment.is_empty() {
        return Err(malformed(raw, "empty segment"));
    }
    // u64::from_str accepts a leading '+'
    if !segment.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed(raw, &format!("non-numeric segment {:?}", segment)));
    }
    segment
        .parse::<PointId>()
        .map_err(|e| malformed(raw, &format!("segment {:?}: {}", segment, e)))
}

fn malformed(raw: &str, message: &str) -> DomainError {
    DomainError::MalformedPath {
        raw: raw.to_string(),
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(vec![], "")]
    #[case(vec![1], "1")]
    #[case(vec![1, 2, 3], "1.2.3")]
    #[case(vec![12, 1], "12.1")]
    #[case(vec![u64::MAX, 0], "18446744073709551615.0")]
    fn given_ancestors_when_encoding_then_round_trips(
        #[case] ancestors: Vec<PointId>,
        #[case] encoded: &str,
    ) {
        assert_eq!(encode(&ancestors), encoded);
        assert_eq!(decode(encoded).unwrap(), ancestors);
    }

    #[test]
    fn given_multi_digit_id_when_decoding_then_does_not_contain_prefix_id() {
        let decoded = decode("12").unwrap();
        assert_eq!(decoded, vec![12]);
        assert!(!decoded.contains(&1));
    }

    #[rstest]
    #[case(".")]
    #[case("1..2")]
    #[case("1.")]
    #[case(".1")]
    #[case("1.a")]
    #[case("+1")]
    #[case("-1")]
    #[case(" 1")]
    #[case("18446744073709551616")]
    fn given_malformed_path_when_decoding_then_errors(#[case] raw: &str) {
        let result = decode(raw);
        assert!(
            matches!(result, Err(DomainError::MalformedPath { .. })),
            "expected malformed path for {:?}, got {:?}",
            raw,
            result
        );
    }
}
