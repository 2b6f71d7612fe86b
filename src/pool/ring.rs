/// Round-robin sequence with an explicit cursor
///
/// `next` returns the element under the cursor and advances it circularly. Removing
/// an element before the cursor shifts the cursor back so the element that followed
/// the removed one is still the next one returned.
#[derive(Debug, Clone)]
pub struct ResourcePool<T> {
    items: Vec<T>,
    cursor: usize,
}

impl<T> ResourcePool<T> {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            cursor: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Index of the element the next call to `next` will return
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Returns the index under the cursor and advances it
    pub fn next_index(&mut self) -> Option<usize> {
        if self.items.is_empty() {
            return None;
        }
        if self.cursor >= self.items.len() {
            self.cursor = 0;
        }
        let index = self.cursor;
        self.cursor = (self.cursor + 1) % self.items.len();
        Some(index)
    }

    pub fn next(&mut self) -> Option<&T> {
        let index = self.next_index()?;
        self.items.get(index)
    }

    pub fn push(&mut self, item: T) {
        self.items.push(item);
    }

    /// Removes the element at `index`, keeping the rotation order intact
    pub fn remove(&mut self, index: usize) -> Option<T> {
        if index >= self.items.len() {
            return None;
        }
        let item = self.items.remove(index);
        if index < self.cursor {
            self.cursor -= 1;
        }
        if self.cursor >= self.items.len() {
            self.cursor = 0;
        }
        Some(item)
    }

    pub fn position<P>(&self, predicate: P) -> Option<usize>
    where
        P: FnMut(&T) -> bool,
    {
        self.items.iter().position(predicate)
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.items.get_mut(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.items.iter_mut()
    }
}

impl<T> Default for ResourcePool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> FromIterator<T> for ResourcePool<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
            cursor: 0,
        }
    }
}
