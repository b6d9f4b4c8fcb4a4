use std::collections::HashMap;
use std::fmt;

const WORD_BITS: usize = 64;

/// An immutable set of context indices, the value type for "which contexts apply here".
///
/// A `ContextSet` is a fixed-universe bit vector over the context indices allocated by a
/// [`crate::context::ContextStore`]. Every mutator returns a new instance; equality and
/// hashing are by bit content. Index 0 is the reserved "instrumentation disabled" marker
/// and is forced on by the catalog's filter parser regardless of user input.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct ContextSet {
    words: Vec<u64>,
}

impl ContextSet {
    /// Creates an empty context set
    #[must_use]
    pub fn new() -> Self {
        ContextSet { words: Vec::new() }
    }

    /// Reconstructs a set from its backing words, as read from persistent storage
    #[must_use]
    pub fn from_words(words: Vec<u64>) -> Self {
        let mut set = ContextSet { words };
        set.canonicalize();
        set
    }

    /// The backing words of this set, trailing zero words trimmed
    #[must_use]
    pub fn words(&self) -> &[u64] {
        &self.words
    }

    /// Returns true if no bit is set
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Returns true if bit `index` is set
    #[must_use]
    pub fn get(&self, index: usize) -> bool {
        let word = index / WORD_BITS;
        match self.words.get(word) {
            Some(bits) => bits & (1u64 << (index % WORD_BITS)) != 0,
            None => false,
        }
    }

    /// Returns a new set with bit `index` set
    #[must_use]
    pub fn set(&self, index: usize) -> ContextSet {
        let word = index / WORD_BITS;
        let mut words = self.words.clone();
        if words.len() <= word {
            words.resize(word + 1, 0);
        }
        words[word] |= 1u64 << (index % WORD_BITS);
        ContextSet { words }
    }

    /// Returns a new set with bit `index` cleared
    #[must_use]
    pub fn clear(&self, index: usize) -> ContextSet {
        let word = index / WORD_BITS;
        if word >= self.words.len() {
            return self.clone();
        }
        let mut words = self.words.clone();
        words[word] &= !(1u64 << (index % WORD_BITS));
        let mut result = ContextSet { words };
        result.canonicalize();
        result
    }

    /// Returns the intersection of this set and `other`
    #[must_use]
    pub fn and(&self, other: &ContextSet) -> ContextSet {
        let len = self.words.len().min(other.words.len());
        let words = (0..len).map(|i| self.words[i] & other.words[i]).collect();
        let mut result = ContextSet { words };
        result.canonicalize();
        result
    }

    /// Returns the union of this set and `other`
    #[must_use]
    pub fn or(&self, other: &ContextSet) -> ContextSet {
        let (longer, shorter) = if self.words.len() >= other.words.len() {
            (&self.words, &other.words)
        } else {
            (&other.words, &self.words)
        };
        let mut words = longer.clone();
        for (i, bits) in shorter.iter().enumerate() {
            words[i] |= bits;
        }
        ContextSet { words }
    }

    /// Returns a new set with every bit in `[from, to)` inverted
    #[must_use]
    pub fn flip(&self, from: usize, to: usize) -> ContextSet {
        if from >= to {
            return self.clone();
        }
        let top_word = (to - 1) / WORD_BITS;
        let mut words = self.words.clone();
        if words.len() <= top_word {
            words.resize(top_word + 1, 0);
        }
        for index in from..to {
            words[index / WORD_BITS] ^= 1u64 << (index % WORD_BITS);
        }
        let mut result = ContextSet { words };
        result.canonicalize();
        result
    }

    /// Returns true if this set and `other` share at least one set bit
    #[must_use]
    pub fn intersects(&self, other: &ContextSet) -> bool {
        let len = self.words.len().min(other.words.len());
        (0..len).any(|i| self.words[i] & other.words[i] != 0)
    }

    /// Returns the index of the first set bit at or after `from`, or `None` if there is
    /// no further set bit. This is the sole iteration primitive over a set.
    #[must_use]
    pub fn next_set_bit(&self, from: usize) -> Option<usize> {
        let mut word = from / WORD_BITS;
        if word >= self.words.len() {
            return None;
        }
        // Mask off bits below `from` in the first word, then scan whole words.
        let mut bits = self.words[word] & (!0u64 << (from % WORD_BITS));
        loop {
            if bits != 0 {
                return Some(word * WORD_BITS + bits.trailing_zeros() as usize);
            }
            word += 1;
            if word >= self.words.len() {
                return None;
            }
            bits = self.words[word];
        }
    }

    /// Projects this set through an `old index -> new index` mapping, producing a set in
    /// the target index universe. Source bits with no mapping entry are silently dropped.
    ///
    /// Used after a cross-database merge to rewrite element context sets into the merged
    /// store's universe.
    #[must_use]
    pub fn remap(&self, mapping: &HashMap<usize, usize>) -> ContextSet {
        let mut result = ContextSet::new();
        let mut bit = self.next_set_bit(0);
        while let Some(index) = bit {
            if let Some(&target) = mapping.get(&index) {
                result = result.set(target);
            }
            bit = self.next_set_bit(index + 1);
        }
        result
    }

    fn canonicalize(&mut self) {
        while self.words.last() == Some(&0) {
            self.words.pop();
        }
    }
}

impl fmt::Display for ContextSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        let mut bit = self.next_set_bit(0);
        let mut first = true;
        while let Some(index) = bit {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{index}")?;
            first = false;
            bit = self.next_set_bit(index + 1);
        }
        write!(f, "}}")
    }
}

impl fmt::Debug for ContextSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContextSet{self}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_then_get() {
        let cs = ContextSet::new();
        for i in [0, 1, 63, 64, 65, 200] {
            assert!(cs.set(i).get(i));
            assert!(!cs.get(i));
        }
    }

    #[test]
    fn test_clear() {
        let cs = ContextSet::new().set(5).set(70);
        assert!(!cs.clear(5).get(5));
        assert!(cs.clear(5).get(70));
        // Clearing an out-of-range bit is a no-op
        assert_eq!(cs.clear(500), cs);
    }

    #[test]
    fn test_set_idempotent() {
        let cs = ContextSet::new().set(9);
        assert_eq!(cs.set(9), cs);
    }

    #[test]
    fn test_value_equality() {
        let a = ContextSet::new().set(3).set(80);
        let b = ContextSet::new().set(80).set(3);
        assert_eq!(a, b);
        // Set-then-clear of a high bit must not leave a trailing word behind
        let c = a.set(300).clear(300);
        assert_eq!(c, a);
    }

    #[test]
    fn test_or_commutative_associative() {
        let a = ContextSet::new().set(1).set(64);
        let b = ContextSet::new().set(2);
        let c = ContextSet::new().set(130);
        assert_eq!(a.or(&b), b.or(&a));
        assert_eq!(a.or(&b).or(&c), a.or(&b.or(&c)));
    }

    #[test]
    fn test_and_commutative_associative() {
        let a = ContextSet::new().set(1).set(64).set(130);
        let b = ContextSet::new().set(64).set(130);
        let c = ContextSet::new().set(130).set(131);
        assert_eq!(a.and(&b), b.and(&a));
        assert_eq!(a.and(&b).and(&c), a.and(&b.and(&c)));
    }

    #[test]
    fn test_flip_range() {
        let cs = ContextSet::new().set(1).flip(0, 4);
        assert!(cs.get(0));
        assert!(!cs.get(1));
        assert!(cs.get(2));
        assert!(cs.get(3));
        assert!(!cs.get(4));
    }

    #[test]
    fn test_flip_empty_range() {
        let cs = ContextSet::new().set(7);
        assert_eq!(cs.flip(3, 3), cs);
    }

    #[test]
    fn test_intersects() {
        let a = ContextSet::new().set(5).set(100);
        let b = ContextSet::new().set(100);
        let c = ContextSet::new().set(6);
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
        assert!(!a.intersects(&ContextSet::new()));
    }

    #[test]
    fn test_next_set_bit() {
        let cs = ContextSet::new().set(2).set(63).set(64).set(191);
        assert_eq!(cs.next_set_bit(0), Some(2));
        assert_eq!(cs.next_set_bit(3), Some(63));
        assert_eq!(cs.next_set_bit(63), Some(63));
        assert_eq!(cs.next_set_bit(65), Some(191));
        assert_eq!(cs.next_set_bit(192), None);
        assert_eq!(ContextSet::new().next_set_bit(0), None);
    }

    #[test]
    fn test_remap_projects_and_drops() {
        let cs = ContextSet::new().set(0).set(19).set(20);
        let mut mapping = HashMap::new();
        mapping.insert(0, 0);
        mapping.insert(19, 21);
        // index 20 has no mapping entry and is dropped
        let remapped = cs.remap(&mapping);
        assert_eq!(remapped, ContextSet::new().set(0).set(21));
    }

    #[test]
    fn test_remap_empty_mapping() {
        let cs = ContextSet::new().set(1).set(2);
        assert_eq!(cs.remap(&HashMap::new()), ContextSet::new());
    }

    #[test]
    fn test_display_lists_indices() {
        let cs = ContextSet::new().set(1).set(70);
        assert_eq!(cs.to_string(), "{1, 70}");
        assert_eq!(format!("{cs:?}"), "ContextSet{1, 70}");
        assert_eq!(ContextSet::new().to_string(), "{}");
    }

    #[test]
    fn test_from_words_canonical() {
        let a = ContextSet::from_words(vec![0b100, 0, 0]);
        let b = ContextSet::new().set(2);
        assert_eq!(a, b);
        assert_eq!(a.words(), b.words());
    }
}
