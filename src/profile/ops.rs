//! Classification of raw communication primitives into canonical op tags.

use serde_json::Value;
use std::collections::BTreeMap;

/// Canonical communication op tags. Raw profile names are matched against a
/// closed set; anything else lands in `Unclassified` so its bytes still reach
/// the schedule instead of being dropped.
///
/// Declaration order defines map/emission order, so keep it stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CommOp {
    Allreduce,
    AllreduceAsync,
    Allgather,
    Reducescatter,
    Alltoall,
    Sendrecv,
    Unclassified,
}

impl CommOp {
    /// Matches a raw op name from the profile. Expert-parallel qualified
    /// variants fold into their base collective.
    pub fn classify(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "ALLREDUCE" => Some(Self::Allreduce),
            "ALLREDUCE_ASYNC" => Some(Self::AllreduceAsync),
            "ALLGATHER" | "ALLGATHER_DP_EP" => Some(Self::Allgather),
            "REDUCESCATTER" | "REDUCESCATTER_DP_EP" => Some(Self::Reducescatter),
            "ALLTOALL" | "ALLTOALL_EP" => Some(Self::Alltoall),
            "SENDRECV" => Some(Self::Sendrecv),
            _ => None,
        }
    }

    /// Tag string used for byte-map identity and comm-id suffixes.
    pub fn tag(self) -> &'static str {
        match self {
            Self::Allreduce => "allreduce",
            Self::AllreduceAsync => "allreduce_async",
            Self::Allgather => "allgather",
            Self::Reducescatter => "reducescatter",
            Self::Alltoall => "alltoall",
            Self::Sendrecv => "sendrecv",
            Self::Unclassified => "unclassified",
        }
    }

    /// Op string emitted on collective steps. The simulator's collective
    /// engine only understands the four ring shapes, so sendrecv-flavored and
    /// unclassified byte buckets ride as plain allreduce.
    pub fn collective_op(self) -> &'static str {
        match self {
            Self::AllreduceAsync => "allreduce_async",
            Self::Allgather => "allgather",
            Self::Reducescatter => "reducescatter",
            Self::Alltoall => "alltoall",
            Self::Allreduce | Self::Sendrecv | Self::Unclassified => "allreduce",
        }
    }
}

/// Async detection by suffix, ignoring separator characters, so variants like
/// `allreduce-async` and `ALLREDUCE_ASYNC` all count.
pub fn is_async_op(op: &str) -> bool {
    let normalized = op.trim().to_lowercase();
    let compact: String = normalized
        .chars()
        .filter(|ch| *ch != '_' && *ch != '-')
        .collect();
    compact.ends_with("async")
}

/// First numeric argument of a primitive, interpreted as an element count.
/// Non-positive and non-numeric sizes contribute nothing.
pub fn extract_elems(args: &[Value]) -> u64 {
    let Some(first) = args.first() else {
        return 0;
    };
    match first.as_f64() {
        Some(size) if size > 0.0 => size as u64,
        _ => 0,
    }
}

/// Byte totals keyed by op tag. Ordered so that per-op iteration (and thus
/// step emission and comm-id suffixes) is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpBytes(BTreeMap<CommOp, u64>);

impl OpBytes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds bytes under a tag; repeated adds for the same tag sum. Zero-byte
    /// contributions are dropped so empty tags never appear in the map.
    pub fn add(&mut self, op: CommOp, bytes: u64) {
        if bytes == 0 {
            return;
        }
        *self.0.entry(op).or_insert(0) += bytes;
    }

    /// Key-by-key sum merge. Associative and commutative, so fold order over
    /// layer records does not affect the result.
    pub fn merge(&mut self, other: &OpBytes) {
        for (&op, &bytes) in &other.0 {
            self.add(op, bytes);
        }
    }

    pub fn total(&self) -> u64 {
        self.0.values().sum()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, op: CommOp) -> u64 {
        self.0.get(&op).copied().unwrap_or(0)
    }

    pub fn entries(&self) -> Vec<(CommOp, u64)> {
        self.0.iter().map(|(&op, &bytes)| (op, bytes)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn classify_known_ops_and_ep_variants() {
        assert_eq!(CommOp::classify("ALLREDUCE"), Some(CommOp::Allreduce));
        assert_eq!(
            CommOp::classify("ALLREDUCE_ASYNC"),
            Some(CommOp::AllreduceAsync)
        );
        assert_eq!(CommOp::classify("ALLGATHER"), Some(CommOp::Allgather));
        assert_eq!(CommOp::classify("ALLGATHER_DP_EP"), Some(CommOp::Allgather));
        assert_eq!(
            CommOp::classify("REDUCESCATTER"),
            Some(CommOp::Reducescatter)
        );
        assert_eq!(
            CommOp::classify("REDUCESCATTER_DP_EP"),
            Some(CommOp::Reducescatter)
        );
        assert_eq!(CommOp::classify("ALLTOALL"), Some(CommOp::Alltoall));
        assert_eq!(CommOp::classify("ALLTOALL_EP"), Some(CommOp::Alltoall));
        assert_eq!(CommOp::classify("SENDRECV"), Some(CommOp::Sendrecv));
        assert_eq!(CommOp::classify(" allreduce "), Some(CommOp::Allreduce));
        assert_eq!(CommOp::classify("BROADCAST"), None);
        assert_eq!(CommOp::classify(""), None);
    }

    #[test]
    fn async_suffix_ignores_separators() {
        assert!(is_async_op("allreduce_async"));
        assert!(is_async_op("allreduce-async"));
        assert!(is_async_op("ALLREDUCE_ASYNC"));
        assert!(!is_async_op("allreduce"));
        assert!(!is_async_op("async_allreduce"));
    }

    #[test]
    fn extract_elems_takes_first_positive_numeric() {
        assert_eq!(extract_elems(&[json!(1024), json!(4)]), 1024);
        assert_eq!(extract_elems(&[json!(12.7)]), 12);
        assert_eq!(extract_elems(&[json!(0)]), 0);
        assert_eq!(extract_elems(&[json!(-5)]), 0);
        assert_eq!(extract_elems(&[json!("big")]), 0);
        assert_eq!(extract_elems(&[]), 0);
    }

    #[test]
    fn op_bytes_adds_and_merges_by_key() {
        let mut a = OpBytes::new();
        a.add(CommOp::Allreduce, 100);
        a.add(CommOp::Allreduce, 50);
        a.add(CommOp::Allgather, 0);
        assert_eq!(a.get(CommOp::Allreduce), 150);
        assert_eq!(a.len(), 1);

        let mut b = OpBytes::new();
        b.add(CommOp::Allreduce, 25);
        b.add(CommOp::Alltoall, 10);
        a.merge(&b);
        assert_eq!(a.get(CommOp::Allreduce), 175);
        assert_eq!(a.get(CommOp::Alltoall), 10);
        assert_eq!(a.total(), 185);
    }

    #[test]
    fn op_bytes_iteration_follows_declaration_order() {
        let mut map = OpBytes::new();
        map.add(CommOp::Alltoall, 1);
        map.add(CommOp::Allreduce, 2);
        map.add(CommOp::Reducescatter, 3);
        let tags: Vec<&str> = map.entries().iter().map(|(op, _)| op.tag()).collect();
        assert_eq!(tags, vec!["allreduce", "reducescatter", "alltoall"]);
    }

    #[test]
    fn unclassified_rides_as_allreduce_on_the_wire() {
        assert_eq!(CommOp::Unclassified.collective_op(), "allreduce");
        assert_eq!(CommOp::Sendrecv.collective_op(), "allreduce");
        assert_eq!(CommOp::AllreduceAsync.collective_op(), "allreduce_async");
        assert!(is_async_op(CommOp::AllreduceAsync.collective_op()));
        assert!(!is_async_op(CommOp::Unclassified.collective_op()));
    }
}
