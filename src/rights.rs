//! Handle rights.
//!
//! Rights are a capability bitmask attached to a specific handle, not to
//! the dispatcher it refers to — reducing the rights on one handle must
//! not affect other handles bound to the same dispatcher. Built as a
//! hand-rolled `u32` bitmask rather than pulling in the `bitflags` crate:
//! unlike a typical interest set, `Rights` must be able to represent the
//! empty set (a handle can have zero rights after enough reductions), so
//! it wraps a plain `u32` instead of a `NonZeroU16`.

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign, Sub};

#[derive(Copy, Clone, PartialEq, Eq, Default)]
pub struct Rights(u32);

const DUPLICATE: u32 = 1 << 0;
const TRANSFER: u32 = 1 << 1;
const READ: u32 = 1 << 2;
const WRITE: u32 = 1 << 3;
const GET_OPTIONS: u32 = 1 << 4;
const SET_OPTIONS: u32 = 1 << 5;
const EXECUTE: u32 = 1 << 6;

impl Rights {
    pub const NONE: Rights = Rights(0);
    pub const DUPLICATE: Rights = Rights(DUPLICATE);
    pub const TRANSFER: Rights = Rights(TRANSFER);
    pub const READ: Rights = Rights(READ);
    pub const WRITE: Rights = Rights(WRITE);
    pub const GET_OPTIONS: Rights = Rights(GET_OPTIONS);
    pub const SET_OPTIONS: Rights = Rights(SET_OPTIONS);
    /// Extension right for mapping a shared buffer executable.
    pub const EXECUTE: Rights = Rights(EXECUTE);

    /// The rights granted to a freshly created message-pipe endpoint or
    /// data-pipe side: every basic right except `DUPLICATE`.
    pub const PIPE_DEFAULT: Rights = Rights(READ | WRITE | GET_OPTIONS | SET_OPTIONS | TRANSFER);

    /// The rights granted to a freshly created event, event pair, or
    /// shared buffer handle.
    pub const STANDARD_DEFAULT: Rights =
        Rights(DUPLICATE | TRANSFER | READ | WRITE | GET_OPTIONS | SET_OPTIONS);

    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn from_bits(bits: u32) -> Rights {
        Rights(bits)
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn contains(self, other: Rights) -> bool {
        (self.0 & other.0) == other.0
    }

    #[inline]
    pub const fn intersects(self, other: Rights) -> bool {
        (self.0 & other.0) != 0
    }

    /// `self` with every bit in `remove` cleared.
    #[inline]
    pub const fn minus(self, remove: Rights) -> Rights {
        Rights(self.0 & !remove.0)
    }
}

impl BitOr for Rights {
    type Output = Rights;
    #[inline]
    fn bitor(self, rhs: Rights) -> Rights {
        Rights(self.0 | rhs.0)
    }
}

impl BitOrAssign for Rights {
    #[inline]
    fn bitor_assign(&mut self, rhs: Rights) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for Rights {
    type Output = Rights;
    #[inline]
    fn bitand(self, rhs: Rights) -> Rights {
        Rights(self.0 & rhs.0)
    }
}

impl Sub for Rights {
    type Output = Rights;
    #[inline]
    fn sub(self, rhs: Rights) -> Rights {
        self.minus(rhs)
    }
}

impl fmt::Debug for Rights {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flags: &[(Rights, &str)] = &[
            (Rights::DUPLICATE, "DUPLICATE"),
            (Rights::TRANSFER, "TRANSFER"),
            (Rights::READ, "READ"),
            (Rights::WRITE, "WRITE"),
            (Rights::GET_OPTIONS, "GET_OPTIONS"),
            (Rights::SET_OPTIONS, "SET_OPTIONS"),
            (Rights::EXECUTE, "EXECUTE"),
        ];
        let mut first = true;
        for (flag, name) in flags {
            if self.contains(*flag) {
                if !first {
                    f.write_str(" | ")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        if first {
            f.write_str("NONE")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reduction_is_one_directional() {
        let full = Rights::STANDARD_DEFAULT;
        let reduced = full.minus(Rights::WRITE);
        assert!(!reduced.contains(Rights::WRITE));
        assert!(reduced.contains(Rights::READ));
        // reducing twice with the same mask is idempotent
        assert_eq!(reduced.minus(Rights::WRITE), reduced);
    }

    #[test]
    fn pipe_default_has_no_duplicate() {
        assert!(!Rights::PIPE_DEFAULT.contains(Rights::DUPLICATE));
        assert!(Rights::PIPE_DEFAULT.contains(Rights::TRANSFER));
    }

    #[test]
    fn debug_lists_set_flags() {
        let r = Rights::READ | Rights::WRITE;
        assert_eq!(format!("{:?}", r), "READ | WRITE");
        assert_eq!(format!("{:?}", Rights::NONE), "NONE");
    }
}
