//! Primitive topologies and the index arithmetic shared by every draw path.

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Topology {
    PointList,
    LineList,
    LineStrip,
    LineLoop,
    TriangleList,
    TriangleStrip,
    TriangleFan,
}

impl Topology {
    /// The number of primitives `count` vertices make up.
    pub fn primitive_count(self, count: usize) -> usize {
        match self {
            Topology::PointList => count,
            Topology::LineList => count / 2,
            Topology::LineStrip => count.saturating_sub(1),
            Topology::LineLoop => {
                if count >= 2 {
                    count
                } else {
                    0
                }
            }
            Topology::TriangleList => count / 3,
            Topology::TriangleStrip | Topology::TriangleFan => count.saturating_sub(2),
        }
    }

    /// The fewest vertices that make up one primitive.
    pub fn min_vertices(self) -> usize {
        match self {
            Topology::PointList => 1,
            Topology::LineList | Topology::LineStrip | Topology::LineLoop => 2,
            Topology::TriangleList | Topology::TriangleStrip | Topology::TriangleFan => 3,
        }
    }

    #[inline]
    pub fn is_lines(self) -> bool {
        match self {
            Topology::LineList | Topology::LineStrip | Topology::LineLoop => true,
            _ => false,
        }
    }
}

/// The smallest and largest referenced vertex, in one pass.
pub fn index_range(indices: &[u32]) -> Option<(u32, u32)> {
    let mut iter = indices.iter();
    let first = *iter.next()?;
    Some(iter.fold((first, first), |(lo, hi), &v| (lo.min(v), hi.max(v))))
}

/// Splits an index list into maximal runs of consecutive indices, as
/// `(first_vertex, length)` pairs in input order.
pub fn point_runs(indices: &[u32]) -> Vec<(u32, usize)> {
    let mut runs: Vec<(u32, usize)> = Vec::new();
    for &v in indices {
        if let Some(last) = runs.last_mut() {
            if u64::from(last.0) + last.1 as u64 == u64::from(v) {
                last.1 += 1;
                continue;
            }
        }

        runs.push((v, 1));
    }

    runs
}

/// The indices of the two segments closing a line loop drawn as a strip:
/// `{last, first}` of the referenced vertices.
pub fn loop_closure(indices: Option<&[u32]>, count: usize) -> Option<[u32; 2]> {
    if count < 2 {
        return None;
    }

    match indices {
        Some(v) => Some([v[count - 1], v[0]]),
        None => Some([(count - 1) as u32, 0]),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn counts() {
        assert_eq!(Topology::PointList.primitive_count(5), 5);
        assert_eq!(Topology::LineList.primitive_count(5), 2);
        assert_eq!(Topology::LineStrip.primitive_count(5), 4);
        assert_eq!(Topology::LineLoop.primitive_count(5), 5);
        assert_eq!(Topology::LineLoop.primitive_count(1), 0);
        assert_eq!(Topology::TriangleList.primitive_count(7), 2);
        assert_eq!(Topology::TriangleStrip.primitive_count(4), 2);
        assert_eq!(Topology::TriangleFan.primitive_count(2), 0);
        assert_eq!(Topology::LineStrip.primitive_count(0), 0);
    }

    #[test]
    fn ranges() {
        assert_eq!(index_range(&[]), None);
        assert_eq!(index_range(&[4, 2, 9, 3]), Some((2, 9)));
    }

    #[test]
    fn runs() {
        assert_eq!(point_runs(&[3, 4, 5, 9]), vec![(3, 3), (9, 1)]);
        assert_eq!(point_runs(&[1, 1, 2]), vec![(1, 1), (1, 2)]);
        assert!(point_runs(&[]).is_empty());
    }

    #[test]
    fn closure() {
        assert_eq!(loop_closure(None, 4), Some([3, 0]));
        assert_eq!(loop_closure(Some(&[7, 2, 5]), 3), Some([5, 7]));
        assert_eq!(loop_closure(None, 1), None);
    }
}
