//! Generic LRU table substrate shared by the miss tables.

use itertools::Itertools;

/// Replacement order for the ways in a single set.
///
/// `rank[i]` is the age of way `i`: zero is the most-recently-used way, and
/// the victim is always the way with the maximum rank. Updates are O(ways),
/// which beats pointer-chasing for the small associativities used here.
#[derive(Clone, Debug)]
pub struct LruRanks {
    rank: Vec<usize>,
}
impl LruRanks {
    pub fn new(ways: usize) -> Self {
        Self { rank: (0..ways).collect() }
    }

    pub fn len(&self) -> usize { self.rank.len() }

    /// Mark way `k` as most-recently-used, aging every younger way by one.
    pub fn touch(&mut self, k: usize) {
        let pivot = self.rank[k];
        for r in self.rank.iter_mut() {
            if (*r < pivot) { *r += 1; }
        }
        self.rank[k] = 0;
    }

    /// Return the least-recently-used way.
    pub fn victim(&self) -> usize {
        self.rank.iter().position_max()
            .expect("replacement order over zero ways")
    }
}

/// One way of a fully-associative table.
#[derive(Clone, Debug)]
struct Way<V> {
    tag: u64,
    value: V,
}

/// A fully-associative tag/value store with LRU replacement.
///
/// Lookups via [`LruTable::get`] do not reorder the ways; callers that want
/// a reference to count as a use call [`LruTable::touch`] explicitly.
#[derive(Clone, Debug)]
pub struct LruTable<V> {
    ways: Vec<Option<Way<V>>>,
    lru: LruRanks,
}
impl<V> LruTable<V> {
    pub fn new(n_ways: usize) -> Self {
        assert!(n_ways > 0);
        let mut ways = Vec::with_capacity(n_ways);
        for _ in 0..n_ways {
            ways.push(None);
        }
        Self { ways, lru: LruRanks::new(n_ways) }
    }

    fn find(&self, tag: u64) -> Option<usize> {
        self.ways.iter().position(|w| {
            matches!(w, Some(way) if way.tag == tag)
        })
    }

    pub fn contains(&self, tag: u64) -> bool {
        self.find(tag).is_some()
    }

    /// Bind `tag` to `value`, overwriting a matching way or replacing the
    /// LRU victim (valid or not). The bound way becomes most-recently-used.
    pub fn insert(&mut self, tag: u64, value: V) {
        let idx = match self.find(tag) {
            Some(idx) => idx,
            None => self.lru.victim(),
        };
        self.ways[idx] = Some(Way { tag, value });
        self.lru.touch(idx);
    }

    /// Mark the way holding `tag` as most-recently-used.
    pub fn touch(&mut self, tag: u64) {
        let idx = self.find(tag).expect("touch of an absent tag");
        self.lru.touch(idx);
    }

    pub fn get(&self, tag: u64) -> Option<&V> {
        self.find(tag).map(|idx| {
            &self.ways[idx].as_ref().unwrap().value
        })
    }

    pub fn get_mut(&mut self, tag: u64) -> Option<&mut V> {
        let idx = self.find(tag)?;
        Some(&mut self.ways[idx].as_mut().unwrap().value)
    }
}

/// A set-associative LRU map from an integer key to `V`.
///
/// The hash quotient selects the set and the remainder of the hash is kept
/// as the in-set tag, so the full hash is recoverable and two keys with the
/// same hash always collide onto the same way.
pub struct SetAssocLruTable<V> {
    sets: Vec<LruTable<V>>,

    /// Function used to hash a key before set selection.
    hash_fn: fn(u64) -> u64,
}
impl<V> SetAssocLruTable<V> {
    pub fn new(n_sets: usize, n_ways: usize, hash_fn: fn(u64) -> u64) -> Self {
        assert!(n_sets > 0);
        let mut sets = Vec::with_capacity(n_sets);
        for _ in 0..n_sets {
            sets.push(LruTable::new(n_ways));
        }
        Self { sets, hash_fn }
    }

    pub fn num_sets(&self) -> usize { self.sets.len() }

    /// Resolve a key to its set index and in-set tag.
    pub fn set_and_tag(&self, key: u64) -> (usize, u64) {
        let h = (self.hash_fn)(key);
        let n = self.sets.len() as u64;
        ((h % n) as usize, h / n)
    }

    pub fn contains(&self, key: u64) -> bool {
        let (set, tag) = self.set_and_tag(key);
        self.sets[set].contains(tag)
    }

    pub fn insert(&mut self, key: u64, value: V) {
        let (set, tag) = self.set_and_tag(key);
        self.sets[set].insert(tag, value);
    }

    pub fn touch(&mut self, key: u64) {
        let (set, tag) = self.set_and_tag(key);
        self.sets[set].touch(tag);
    }

    pub fn get(&self, key: u64) -> Option<&V> {
        let (set, tag) = self.set_and_tag(key);
        self.sets[set].get(tag)
    }

    pub fn get_mut(&mut self, key: u64) -> Option<&mut V> {
        let (set, tag) = self.set_and_tag(key);
        self.sets[set].get_mut(tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_permutation(lru: &LruRanks) -> bool {
        let mut seen = vec![false; lru.len()];
        for i in 0..lru.len() {
            let r = lru.rank[i];
            if r >= lru.len() || seen[r] { return false; }
            seen[r] = true;
        }
        true
    }

    #[test]
    fn ranks_stay_a_permutation() {
        let mut lru = LruRanks::new(4);
        assert!(is_permutation(&lru));
        for k in [2, 2, 0, 3, 1, 3, 0, 2] {
            lru.touch(k);
            assert!(is_permutation(&lru));
            assert_eq!(lru.rank[k], 0);
        }
    }

    #[test]
    fn victim_is_oldest() {
        let mut lru = LruRanks::new(4);
        // Initial order ages way 3 the most
        assert_eq!(lru.victim(), 3);
        lru.touch(3);
        assert_eq!(lru.victim(), 2);
        lru.touch(2);
        lru.touch(0);
        lru.touch(1);
        assert_eq!(lru.victim(), 3);
    }

    #[test]
    fn insert_then_get() {
        let mut t = LruTable::new(2);
        t.insert(7, "seven");
        t.insert(9, "nine");
        assert_eq!(t.get(7), Some(&"seven"));
        assert_eq!(t.get(9), Some(&"nine"));
        assert!(t.get(8).is_none());
    }

    #[test]
    fn insert_overwrites_in_place() {
        let mut t = LruTable::new(2);
        t.insert(7, 1usize);
        t.insert(9, 2);
        t.insert(7, 3);
        assert_eq!(t.get(7), Some(&3));
        assert_eq!(t.get(9), Some(&2));
    }

    #[test]
    fn eviction_follows_lru_order() {
        let mut t = LruTable::new(2);
        t.insert(1, ());
        t.insert(2, ());
        t.touch(1);
        // Way holding 2 is now oldest
        t.insert(3, ());
        assert!(t.contains(1));
        assert!(!t.contains(2));
        assert!(t.contains(3));
    }

    #[test]
    fn set_and_tag_are_deterministic() {
        let t: SetAssocLruTable<()> = SetAssocLruTable::new(128, 4, |k| k);
        let key = 0xbeef;
        assert_eq!(t.set_and_tag(key), t.set_and_tag(key));
        assert_eq!(t.set_and_tag(key), (0xbeef % 128, 0xbeef / 128));
    }

    #[test]
    fn sets_age_independently() {
        // Identity hash: keys 0 and 2 share set 0, key 1 lives in set 1.
        let mut t = SetAssocLruTable::new(2, 1, |k| k);
        t.insert(0, 'a');
        t.insert(1, 'b');
        t.insert(2, 'c');
        assert!(!t.contains(0));
        assert_eq!(t.get(1), Some(&'b'));
        assert_eq!(t.get(2), Some(&'c'));
    }
}
