/// Bounded history buffer: newest sample at index 0. Grounded on the
/// teacher's `RollingWindow`, kept near-verbatim.
#[derive(Clone, Debug)]
pub struct RollingWindow<T> {
    history: Vec<T>,
    capacity: usize,
}

impl<T: Clone> RollingWindow<T> {
    pub fn new(capacity: usize) -> Self {
        RollingWindow { history: Vec::with_capacity(capacity), capacity }
    }

    pub fn clear(&mut self) {
        self.history.clear()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn add(&mut self, data: T) {
        self.history.insert(0, data);
        if self.history.len() > self.capacity {
            self.history.pop();
        }
    }

    pub fn last(&self) -> Option<&T> {
        self.history.first()
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.history.get(index)
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_full(&self) -> bool {
        self.capacity > 0 && self.history.len() == self.capacity
    }

    pub fn history(&self) -> &[T] {
        &self.history
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_oldest_once_full() {
        let mut w = RollingWindow::new(3);
        for i in 0..5 {
            w.add(i);
        }
        assert_eq!(w.history(), &[4, 3, 2]);
        assert!(w.is_full());
    }

    #[test]
    fn last_is_most_recent() {
        let mut w = RollingWindow::new(2);
        w.add(1);
        w.add(2);
        assert_eq!(w.last(), Some(&2));
    }
}
