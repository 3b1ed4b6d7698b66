use std::cmp::Ordering;
use std::fmt;

/// A total order over keys. Fixed for the lifetime of a tree; implementations must be pure.
pub trait Comparator<K: ?Sized> {
    fn compare(&self, a: &K, b: &K) -> Ordering;

    #[inline]
    fn equal(&self, a: &K, b: &K) -> bool {
        self.compare(a, b) == Ordering::Equal
    }

    #[inline]
    fn less_than(&self, a: &K, b: &K) -> bool {
        self.compare(a, b) == Ordering::Less
    }
}

/// Orders keys by their `Ord` implementation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NaturalOrder;

impl<K: Ord + ?Sized> Comparator<K> for NaturalOrder {
    #[inline]
    fn compare(&self, a: &K, b: &K) -> Ordering {
        a.cmp(b)
    }
}

/// Lexicographic order over the key bytes, the usual order for encoded memtable keys.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BytewiseComparator;

impl<K: AsRef<[u8]> + ?Sized> Comparator<K> for BytewiseComparator {
    #[inline]
    fn compare(&self, a: &K, b: &K) -> Ordering {
        a.as_ref().cmp(b.as_ref())
    }
}

/// Inverts another comparator.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Reverse<C>(pub C);

impl<K: ?Sized, C: Comparator<K>> Comparator<K> for Reverse<C> {
    #[inline]
    fn compare(&self, a: &K, b: &K) -> Ordering {
        self.0.compare(a, b).reverse()
    }
}

/// Adapts a closure into a `Comparator`.
#[derive(Clone, Copy)]
pub struct FnComparator<F>(pub F);

impl<F> fmt::Debug for FnComparator<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FnComparator")
    }
}

impl<K: ?Sized, F: Fn(&K, &K) -> Ordering> Comparator<K> for FnComparator<F> {
    #[inline]
    fn compare(&self, a: &K, b: &K) -> Ordering {
        (self.0)(a, b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytewise_orders_prefixes_first() {
        let cmp = BytewiseComparator;
        assert_eq!(cmp.compare(b"abc".as_slice(), b"abd".as_slice()), Ordering::Less);
        assert_eq!(cmp.compare(b"ab".as_slice(), b"abc".as_slice()), Ordering::Less);
        assert_eq!(cmp.compare(&vec![0xffu8], &vec![0x00u8, 0x01]), Ordering::Greater);
        assert!(cmp.equal("same", "same"));
    }

    #[test]
    fn test_reverse_and_closure_comparators() {
        let rev = Reverse(NaturalOrder);
        assert!(rev.less_than(&9, &3));
        assert!(!rev.less_than(&3, &9));

        // order by length, then bytes
        let by_len = FnComparator(|a: &String, b: &String| {
            a.len().cmp(&b.len()).then_with(|| a.cmp(b))
        });
        assert!(by_len.less_than(&"zz".to_string(), &"aaa".to_string()));
        assert!(by_len.equal(&"abc".to_string(), &"abc".to_string()));
    }
}
