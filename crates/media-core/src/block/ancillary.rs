use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Four-character tag naming a kind of ancillary data (`b"dovi"`, `b"cc  "`, ...).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct AncillaryTag(pub [u8; 4]);

impl AncillaryTag {
    pub const fn new(tag: [u8; 4]) -> Self {
        Self(tag)
    }
}

impl fmt::Debug for AncillaryTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AncillaryTag({})", String::from_utf8_lossy(&self.0))
    }
}

/// A shared, immutable piece of side data carried along with a block or picture.
///
/// Cloning only takes another reference on the payload.
#[derive(Clone)]
pub struct Ancillary {
    tag: AncillaryTag,
    data: Arc<dyn Any + Send + Sync>,
}

impl Ancillary {
    pub fn new<T: Any + Send + Sync>(tag: AncillaryTag, data: T) -> Self {
        Self {
            tag,
            data: Arc::new(data),
        }
    }

    pub fn from_arc(tag: AncillaryTag, data: Arc<dyn Any + Send + Sync>) -> Self {
        Self { tag, data }
    }

    pub fn tag(&self) -> AncillaryTag {
        self.tag
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.data.downcast_ref::<T>()
    }

    /// True when both values share the same payload allocation.
    pub fn same_payload(&self, other: &Ancillary) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}

impl fmt::Debug for Ancillary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ancillary").field("tag", &self.tag).finish()
    }
}

/// Ancillary data keyed by tag. Each tag appears at most once.
#[derive(Clone, Default, Debug)]
pub struct Ancillaries {
    entries: Vec<Ancillary>,
}

impl Ancillaries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `ancillary`, returning the entry it replaced.
    pub fn insert(&mut self, ancillary: Ancillary) -> Option<Ancillary> {
        match self.entries.iter_mut().find(|e| e.tag == ancillary.tag) {
            Some(slot) => Some(std::mem::replace(slot, ancillary)),
            None => {
                self.entries.push(ancillary);
                None
            }
        }
    }

    pub fn get(&self, tag: AncillaryTag) -> Option<&Ancillary> {
        self.entries.iter().find(|e| e.tag == tag)
    }

    pub fn get_as<T: Any>(&self, tag: AncillaryTag) -> Option<&T> {
        self.get(tag).and_then(Ancillary::downcast_ref)
    }

    pub fn remove(&mut self, tag: AncillaryTag) -> Option<Ancillary> {
        let index = self.entries.iter().position(|e| e.tag == tag)?;
        Some(self.entries.remove(index))
    }

    /// Adds every entry of `other` whose tag is not present yet. Existing entries win.
    pub fn merge(&mut self, other: &Ancillaries) {
        for ancillary in &other.entries {
            if self.get(ancillary.tag).is_none() {
                self.entries.push(ancillary.clone());
            }
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Ancillary> {
        self.entries.iter()
    }
}
