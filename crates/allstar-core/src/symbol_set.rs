use serde::Serialize;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SymbolSet {
    ranges: Vec<(i32, i32)>,
}

impl SymbolSet {
    pub fn new() -> Self {
        Self { ranges: Vec::new() }
    }

    pub fn of(symbol: i32) -> Self {
        Self {
            ranges: vec![(symbol, symbol)],
        }
    }

    pub fn from_range(from: i32, to: i32) -> Self {
        let mut set = Self::new();
        set.add_range(from, to);
        set
    }

    pub fn add(&mut self, symbol: i32) {
        self.add_range(symbol, symbol);
    }

    pub fn add_range(&mut self, from: i32, to: i32) {
        if from > to {
            return;
        }
        let mut lo = from;
        let mut hi = to;
        let mut merged = Vec::with_capacity(self.ranges.len() + 1);
        let mut placed = false;
        for &(a, b) in &self.ranges {
            if b.saturating_add(1) < lo {
                merged.push((a, b));
            } else if hi.saturating_add(1) < a {
                if !placed {
                    merged.push((lo, hi));
                    placed = true;
                }
                merged.push((a, b));
            } else {
                lo = lo.min(a);
                hi = hi.max(b);
            }
        }
        if !placed {
            merged.push((lo, hi));
        }
        self.ranges = merged;
    }

    pub fn add_set(&mut self, other: &SymbolSet) {
        for &(a, b) in &other.ranges {
            self.add_range(a, b);
        }
    }

    pub fn remove(&mut self, symbol: i32) {
        let mut out = Vec::with_capacity(self.ranges.len() + 1);
        for &(a, b) in &self.ranges {
            if symbol < a || symbol > b {
                out.push((a, b));
                continue;
            }
            if a < symbol {
                out.push((a, symbol - 1));
            }
            if symbol < b {
                out.push((symbol + 1, b));
            }
        }
        self.ranges = out;
    }

    pub fn contains(&self, symbol: i32) -> bool {
        self.ranges
            .binary_search_by(|&(a, b)| {
                if b < symbol {
                    std::cmp::Ordering::Less
                } else if a > symbol {
                    std::cmp::Ordering::Greater
                } else {
                    std::cmp::Ordering::Equal
                }
            })
            .is_ok()
    }

    pub fn complement(&self, min: i32, max: i32) -> SymbolSet {
        let mut out = SymbolSet::new();
        let mut next = min;
        for &(a, b) in &self.ranges {
            if b < min {
                continue;
            }
            if a > max {
                break;
            }
            if a > next {
                out.add_range(next, a - 1);
            }
            next = next.max(b.saturating_add(1));
        }
        if next <= max {
            out.add_range(next, max);
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ranges
            .iter()
            .map(|&(a, b)| (b as i64 - a as i64 + 1) as usize)
            .sum()
    }

    pub fn min(&self) -> Option<i32> {
        self.ranges.first().map(|&(a, _)| a)
    }

    pub fn ranges(&self) -> &[(i32, i32)] {
        &self.ranges
    }

    pub fn iter(&self) -> impl Iterator<Item = i32> + '_ {
        self.ranges.iter().flat_map(|&(a, b)| a..=b)
    }
}

impl FromIterator<i32> for SymbolSet {
    fn from_iter<I: IntoIterator<Item = i32>>(iter: I) -> Self {
        let mut set = SymbolSet::new();
        for symbol in iter {
            set.add(symbol);
        }
        set
    }
}

impl Display for SymbolSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        for (idx, &(a, b)) in self.ranges.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            if a == b {
                write!(f, "{a}")?;
            } else {
                write!(f, "{a}..{b}")?;
            }
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_range_coalesces_adjacent_and_overlapping() {
        let mut set = SymbolSet::new();
        set.add_range(5, 7);
        set.add(1);
        set.add_range(2, 4);
        set.add_range(10, 12);
        set.add(8);

        assert_eq!(set.ranges(), &[(1, 8), (10, 12)]);
        assert_eq!(set.len(), 11);
        assert!(set.contains(8));
        assert!(!set.contains(9));
    }

    #[test]
    fn complement_fills_gaps_inside_bounds() {
        let set: SymbolSet = [2, 3, 6].into_iter().collect();
        let complement = set.complement(1, 7);

        assert_eq!(complement.ranges(), &[(1, 1), (4, 5), (7, 7)]);
    }

    #[test]
    fn remove_splits_range() {
        let mut set = SymbolSet::from_range(-2, 3);
        set.remove(-2);
        set.remove(1);

        assert_eq!(set.ranges(), &[(-1, 0), (2, 3)]);
        assert_eq!(set.to_string(), "{-1..0, 2..3}");
    }
}
