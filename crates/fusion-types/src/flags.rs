//! Sticky per-frame status bitmasks.
//!
//! [`flag_set!`](crate::flag_set) declares a `Copy` newtype over an unsigned
//! integer with named constants.  The mask serialises as the bare integer so
//! diagnostics can be logged or exported without allocation.

/// Declare a bitmask newtype with named flag constants.
///
/// ```rust
/// fusion_types::flag_set! {
///     /// Example flags.
///     pub struct ExampleFlags: u8 {
///         const FIRST = 0x01;
///         const SECOND = 0x02;
///     }
/// }
///
/// let mut f = ExampleFlags::NONE;
/// f.insert(ExampleFlags::SECOND);
/// assert!(f.contains(ExampleFlags::SECOND));
/// assert_eq!(f.bits(), 0x02);
/// assert_eq!(f.to_string(), "SECOND");
/// ```
#[macro_export]
macro_rules! flag_set {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident: $repr:ty {
            $(
                $(#[$fmeta:meta])*
                const $flag:ident = $value:expr;
            )*
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Default, ::serde::Serialize, ::serde::Deserialize)]
        #[serde(transparent)]
        $vis struct $name {
            bits: $repr,
        }

        impl $name {
            /// No flag set.
            pub const NONE: Self = Self { bits: 0 };
            $(
                $(#[$fmeta])*
                pub const $flag: Self = Self { bits: $value };
            )*

            /// Wrap a raw mask.
            pub const fn from_bits(bits: $repr) -> Self {
                Self { bits }
            }

            /// The raw mask.
            pub const fn bits(self) -> $repr {
                self.bits
            }

            /// `true` when no flag is set.
            pub const fn is_empty(self) -> bool {
                self.bits == 0
            }

            /// `true` when every flag in `other` is set.
            pub const fn contains(self, other: Self) -> bool {
                self.bits & other.bits == other.bits
            }

            /// `true` when any flag in `other` is set.
            pub const fn intersects(self, other: Self) -> bool {
                self.bits & other.bits != 0
            }

            /// Set every flag in `other`.
            pub fn insert(&mut self, other: Self) {
                self.bits |= other.bits;
            }

            /// Names of the set flags, in declaration order.
            pub fn names(self) -> Vec<&'static str> {
                let mut names = Vec::new();
                $(
                    if self.contains(Self::$flag) {
                        names.push(stringify!($flag));
                    }
                )*
                names
            }
        }

        impl ::core::ops::BitOr for $name {
            type Output = Self;

            fn bitor(self, rhs: Self) -> Self {
                Self { bits: self.bits | rhs.bits }
            }
        }

        impl ::core::ops::BitOrAssign for $name {
            fn bitor_assign(&mut self, rhs: Self) {
                self.bits |= rhs.bits;
            }
        }

        impl ::core::fmt::Debug for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                write!(f, "{}({:#x})", stringify!($name), self.bits)
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                if self.is_empty() {
                    f.write_str("NONE")
                } else {
                    f.write_str(&self.names().join("|"))
                }
            }
        }
    };
}

#[cfg(test)]
mod tests {
    crate::flag_set! {
        struct TestFlags: u8 {
            const A = 0x01;
            const B = 0x04;
        }
    }

    #[test]
    fn insert_and_contains() {
        let mut f = TestFlags::NONE;
        assert!(f.is_empty());
        f.insert(TestFlags::B);
        assert!(f.contains(TestFlags::B));
        assert!(!f.contains(TestFlags::A));
        assert!(f.intersects(TestFlags::A | TestFlags::B));
    }

    #[test]
    fn display_lists_names() {
        assert_eq!((TestFlags::A | TestFlags::B).to_string(), "A|B");
        assert_eq!(TestFlags::NONE.to_string(), "NONE");
        assert_eq!(format!("{:?}", TestFlags::B), "TestFlags(0x4)");
    }

    #[test]
    fn serialises_as_bare_integer() {
        let json = serde_json::to_string(&(TestFlags::A | TestFlags::B)).unwrap();
        assert_eq!(json, "5");
        let back: TestFlags = serde_json::from_str("4").unwrap();
        assert_eq!(back, TestFlags::B);
    }
}
