/// A fixed-capacity binary min-heap over parallel key/weight arrays, used to
/// keep the `capacity` highest-weight items seen so far.
///
/// `offer` inserts and then evicts the minimum once the heap is over capacity.
/// When the heap is full, an item that does not strictly beat the current
/// minimum is rejected before any heap work is done.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundedHeap<K, W = f64> {
  keys: Vec<K>,
  weights: Vec<W>,
  capacity: usize,
}

impl<K, W> BoundedHeap<K, W>
where
  W: PartialOrd + Copy,
{
  pub fn new(capacity: usize) -> Self {
    assert!(capacity > 0, "bounded heap needs a positive capacity");
    Self {
      keys: Vec::new(),
      weights: Vec::new(),
      capacity,
    }
  }

  pub fn len(&self) -> usize {
    self.keys.len()
  }

  pub fn is_empty(&self) -> bool {
    self.keys.is_empty()
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }

  pub fn is_full(&self) -> bool {
    self.len() >= self.capacity
  }

  /// The smallest retained weight, i.e. the weight a new item must beat once
  /// the heap is full
  pub fn min_weight(&self) -> Option<W> {
    self.weights.first().copied()
  }

  /// Whether `offer` would keep an item of this weight. Lets callers skip
  /// building keys that would be rejected anyway.
  pub fn accepts(&self, weight: W) -> bool {
    !self.is_full() || self.weights.first().is_some_and(|min| weight > *min)
  }

  /// Returns true if the item was kept
  pub fn offer(&mut self, key: K, weight: W) -> bool {
    if !self.accepts(weight) {
      return false;
    }

    self.keys.push(key);
    self.weights.push(weight);
    self.sift_up(self.len() - 1);

    if self.len() > self.capacity {
      self.remove_min();
    }
    true
  }

  pub fn remove_min(&mut self) -> Option<(K, W)> {
    if self.is_empty() {
      return None;
    }
    let key = self.keys.swap_remove(0);
    let weight = self.weights.swap_remove(0);
    self.sift_down(0);
    Some((key, weight))
  }

  /// Entry at a heap position. Positions are stable only while the heap is
  /// not modified.
  pub fn get(&self, idx: usize) -> Option<(&K, W)> {
    Some((self.keys.get(idx)?, *self.weights.get(idx)?))
  }

  /// Entries in heap (not sorted) order
  pub fn iter(&self) -> impl Iterator<Item = (&K, W)> + '_ {
    self.keys.iter().zip(self.weights.iter().copied())
  }

  /// Positions of the entries, highest weight first
  pub fn sorted_indexes(&self) -> Vec<usize> {
    let mut idxs = (0..self.len()).collect::<Vec<_>>();
    idxs.sort_by(|a, b| {
      self.weights[*b]
        .partial_cmp(&self.weights[*a])
        .unwrap_or(std::cmp::Ordering::Equal)
    });
    idxs
  }

  /// Consumes the heap, returning its entries highest weight first
  pub fn into_sorted_vec(mut self) -> Vec<(K, W)> {
    let mut out = Vec::with_capacity(self.len());
    while let Some(entry) = self.remove_min() {
      out.push(entry);
    }
    out.reverse();
    out
  }

  fn sift_up(&mut self, mut idx: usize) {
    while idx > 0 {
      let parent = (idx - 1) / 2;
      if self.weights[idx] < self.weights[parent] {
        self.swap(idx, parent);
        idx = parent;
      } else {
        break;
      }
    }
  }

  fn sift_down(&mut self, mut idx: usize) {
    let len = self.len();
    loop {
      let left = 2 * idx + 1;
      let right = left + 1;
      let min = if right < len {
        if self.weights[left] <= self.weights[right] { left } else { right }
      } else if left < len {
        left
      } else {
        return;
      };

      if self.weights[min] < self.weights[idx] {
        self.swap(idx, min);
        idx = min;
      } else {
        return;
      }
    }
  }

  fn swap(&mut self, a: usize, b: usize) {
    self.keys.swap(a, b);
    self.weights.swap(a, b);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_keeps_largest() {
    let mut heap = BoundedHeap::new(3);
    for (key, weight) in [('a', 0.5), ('b', 0.1), ('c', 0.9), ('d', 0.3), ('e', 0.7)] {
      heap.offer(key, weight);
    }

    assert_eq!(heap.len(), 3);
    assert_eq!(heap.min_weight(), Some(0.5));
    assert_eq!(heap.into_sorted_vec(), vec![('c', 0.9), ('e', 0.7), ('a', 0.5)]);
  }

  #[test]
  fn test_full_heap_rejects_ties() {
    let mut heap = BoundedHeap::new(1);
    assert!(heap.offer("first", 0.5));
    assert!(!heap.offer("tie", 0.5));
    assert!(!heap.offer("worse", 0.25));
    assert!(!heap.accepts(0.5));
    assert!(heap.accepts(0.6));
    assert!(heap.offer("better", 0.75));
    assert_eq!(heap.get(0), Some((&"better", 0.75)));
  }

  #[test]
  fn test_sorted_indexes() {
    let mut heap = BoundedHeap::new(4);
    for (key, weight) in [(1, 2.0), (2, 8.0), (3, 4.0), (4, 1.0)] {
      heap.offer(key, weight);
    }
    let keys = heap
      .sorted_indexes()
      .into_iter()
      .map(|idx| *heap.get(idx).unwrap().0)
      .collect::<Vec<_>>();
    assert_eq!(keys, vec![2, 3, 1, 4]);
  }

  #[test]
  fn test_remove_min_drains_in_order() {
    let mut heap = BoundedHeap::new(8);
    for w in [5, 3, 8, 1, 9, 2] {
      heap.offer(w, w);
    }
    let mut drained = Vec::new();
    while let Some((k, _)) = heap.remove_min() {
      drained.push(k);
    }
    assert_eq!(drained, vec![1, 2, 3, 5, 8, 9]);
  }
}
