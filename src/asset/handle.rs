// asset/handle.rs
use std::fmt;
use std::marker::PhantomData;

/// Index into an [`AssetCache`](super::AssetCache) plus the generation of the slot it was issued for.
#[derive(PartialEq, Eq, Hash)]
pub struct Handle<T> {
    index: usize,
    generation: u32,
    _marker: PhantomData<*const T>,
}

// Manually implement Clone without requiring T: Clone
impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({}v{})", self.index, self.generation)
    }
}

impl<T> Handle<T> {
    pub(crate) fn new(index: usize, generation: u32) -> Self {
        Self {
            index,
            generation,
            _marker: PhantomData,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_is_copy() {
        let h1: Handle<String> = Handle::new(5, 0);
        let h2 = h1;
        let h3 = h1;
        assert_eq!(h1.index(), h2.index());
        assert_eq!(h1, h3);
    }

    #[test]
    fn generations_distinguish_handles() {
        let old: Handle<String> = Handle::new(2, 0);
        let new: Handle<String> = Handle::new(2, 1);
        assert_ne!(old, new);
        assert_eq!(format!("{:?}", new), "Handle(2v1)");
    }
}
