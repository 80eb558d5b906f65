use core::fmt;
use core::num::NonZeroUsize;

/// Opaque correlation key linking a submitted native operation to its
/// completion event.
///
/// A tag is pointer-sized and is minted only by the context types
/// ([`BatchContext`], [`RequestCallContext`]) from the address of the native
/// state block they own. While a context is alive no other context can carry
/// the same tag; once the context is disposed its tag may be minted again.
///
/// [`BatchContext`]: crate::BatchContext
/// [`RequestCallContext`]: crate::RequestCallContext
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct Tag(NonZeroUsize);

impl Tag {
    /// Mints the tag for a native block living at `ptr`.
    pub(crate) fn from_ptr<T>(ptr: *const T) -> Self {
        // Boxed blocks are never zero-sized, so their address is never null.
        match NonZeroUsize::new(ptr as usize) {
            Some(raw) => Self(raw),
            None => unreachable!("native block allocated at null"),
        }
    }

    /// Rebuilds a tag from the raw value carried by a native event.
    ///
    /// Returns `None` for the null tag, which the engine never emits for an
    /// operation completion.
    pub const fn from_raw(raw: usize) -> Option<Self> {
        match NonZeroUsize::new(raw) {
            Some(raw) => Some(Self(raw)),
            None => None,
        }
    }

    /// The raw value to hand to the native engine on submission.
    pub const fn into_raw(self) -> usize {
        self.0.get()
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tag({:#x})", self.0.get())
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0.get())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_value_rebuilds_tag() {
        let block = Box::new(7_u64);
        let tag = Tag::from_ptr(&*block);
        assert_eq!(Tag::from_raw(tag.into_raw()), Some(tag));
    }

    #[test]
    fn null_is_not_a_tag() {
        assert_eq!(Tag::from_raw(0), None);
    }

    #[test]
    fn display_is_hex() {
        let tag = Tag::from_raw(0x2a).unwrap();
        assert_eq!(tag.to_string(), "0x2a");
        assert_eq!(format!("{tag:?}"), "Tag(0x2a)");
    }
}
