use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Ordered list of shared callbacks.
///
/// Mutation goes through `&self` so a callback holding the registry can
/// push or remove entries while a dispatch is running.
pub struct Registry<F: ?Sized> {
    entries: RefCell<Vec<Rc<F>>>,
}

impl<F: ?Sized> Default for Registry<F> {
    fn default() -> Self {
        Self {
            entries: RefCell::new(Vec::new()),
        }
    }
}

impl<F: ?Sized> fmt::Debug for Registry<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry").field("len", &self.len()).finish()
    }
}

impl<F: ?Sized> Registry<F> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry. Registering the same `Rc` twice runs it twice.
    pub fn push(&self, entry: Rc<F>) {
        self.entries.borrow_mut().push(entry);
    }

    /// Remove the first entry that is the same allocation as `entry`.
    pub fn remove(&self, entry: &Rc<F>) -> bool {
        let mut entries = self.entries.borrow_mut();
        match entries.iter().position(|e| Rc::ptr_eq(e, entry)) {
            Some(index) => {
                entries.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, entry: &Rc<F>) -> bool {
        self.entries.borrow().iter().any(|e| Rc::ptr_eq(e, entry))
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }

    /// Entries as of now; later mutation does not affect the returned list.
    pub fn snapshot(&self) -> Vec<Rc<F>> {
        self.entries.borrow().clone()
    }
}
