//! Index types for mesh elements.
//!
//! Vertices, half-edges and faces are addressed through distinct wrapper
//! types so a half-edge index can never be used where a vertex is expected.
//! All of them are generic over the storage integer ([`MeshIndex`]); `u32`
//! is the default and `u64` is available for very large meshes.

use std::fmt::{self, Debug};
use std::hash::Hash;

/// Integer types usable as mesh element indices.
pub trait MeshIndex:
    Copy + Eq + Ord + Hash + Debug + Send + Sync + 'static
{
    /// Sentinel for "no element".
    const INVALID: Self;

    /// Convert from `usize`.
    ///
    /// # Panics
    /// Panics in debug builds if the value does not fit.
    fn from_usize(v: usize) -> Self;

    /// Convert to `usize`.
    fn to_usize(self) -> usize;
}

impl MeshIndex for u32 {
    const INVALID: Self = u32::MAX;

    #[inline]
    fn from_usize(v: usize) -> Self {
        debug_assert!(v < u32::MAX as usize, "index {} too large for u32", v);
        v as u32
    }

    #[inline]
    fn to_usize(self) -> usize {
        self as usize
    }
}

impl MeshIndex for u64 {
    const INVALID: Self = u64::MAX;

    #[inline]
    fn from_usize(v: usize) -> Self {
        v as u64
    }

    #[inline]
    fn to_usize(self) -> usize {
        self as usize
    }
}

macro_rules! index_type {
    ($(#[$meta:meta])* $name:ident, $tag:literal) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
        #[repr(transparent)]
        pub struct $name<I: MeshIndex = u32>(I);

        impl<I: MeshIndex> $name<I> {
            /// Wrap a raw position in element storage.
            #[inline]
            pub fn new(index: usize) -> Self {
                Self(I::from_usize(index))
            }

            /// The "no element" sentinel.
            #[inline]
            pub fn invalid() -> Self {
                Self(I::INVALID)
            }

            /// Position in element storage.
            #[inline]
            pub fn index(self) -> usize {
                self.0.to_usize()
            }

            /// Whether this is a real element rather than the sentinel.
            #[inline]
            pub fn is_valid(self) -> bool {
                self.0 != I::INVALID
            }
        }

        impl<I: MeshIndex> Debug for $name<I> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                if self.is_valid() {
                    write!(f, "{}({})", $tag, self.index())
                } else {
                    write!(f, "{}(INVALID)", $tag)
                }
            }
        }

        impl<I: MeshIndex> Default for $name<I> {
            fn default() -> Self {
                Self::invalid()
            }
        }

        impl<I: MeshIndex> From<usize> for $name<I> {
            fn from(v: usize) -> Self {
                Self::new(v)
            }
        }
    };
}

index_type!(
    /// A type-safe vertex index.
    VertexId,
    "V"
);
index_type!(
    /// A type-safe half-edge index.
    HalfEdgeId,
    "HE"
);
index_type!(
    /// A type-safe face index.
    FaceId,
    "F"
);
