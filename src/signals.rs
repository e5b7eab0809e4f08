//! Signals and the `(satisfied, satisfiable)` pair.
//!
//! Same hand-rolled bitmask shape as [`crate::rights::Rights`].

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

#[derive(Copy, Clone, PartialEq, Eq, Default)]
pub struct Signals(u32);

const READABLE: u32 = 1 << 0;
const WRITABLE: u32 = 1 << 1;
const PEER_CLOSED: u32 = 1 << 2;
const READ_THRESHOLD: u32 = 1 << 3;
const WRITE_THRESHOLD: u32 = 1 << 4;
const SIGNAL0: u32 = 1 << 5;
const SIGNAL1: u32 = 1 << 6;
const SIGNAL2: u32 = 1 << 7;
const SIGNAL3: u32 = 1 << 8;
const SIGNAL4: u32 = 1 << 9;

impl Signals {
    pub const NONE: Signals = Signals(0);
    pub const READABLE: Signals = Signals(READABLE);
    pub const WRITABLE: Signals = Signals(WRITABLE);
    pub const PEER_CLOSED: Signals = Signals(PEER_CLOSED);
    pub const READ_THRESHOLD: Signals = Signals(READ_THRESHOLD);
    pub const WRITE_THRESHOLD: Signals = Signals(WRITE_THRESHOLD);
    pub const SIGNAL0: Signals = Signals(SIGNAL0);
    pub const SIGNAL1: Signals = Signals(SIGNAL1);
    pub const SIGNAL2: Signals = Signals(SIGNAL2);
    pub const SIGNAL3: Signals = Signals(SIGNAL3);
    pub const SIGNAL4: Signals = Signals(SIGNAL4);

    /// `SIGNAL0 | SIGNAL1 | SIGNAL2 | SIGNAL3 | SIGNAL4`, the set an
    /// [`crate::dispatcher::event::Event`] or event pair half may mutate
    /// directly via `MojoEventSignal`/`MojoSignal`.
    pub const USER_SIGNALS: Signals = Signals(SIGNAL0 | SIGNAL1 | SIGNAL2 | SIGNAL3 | SIGNAL4);

    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn from_bits(bits: u32) -> Signals {
        Signals(bits)
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn contains(self, other: Signals) -> bool {
        (self.0 & other.0) == other.0
    }

    #[inline]
    pub const fn intersects(self, other: Signals) -> bool {
        (self.0 & other.0) != 0
    }

    #[inline]
    pub const fn minus(self, remove: Signals) -> Signals {
        Signals(self.0 & !remove.0)
    }

    /// Every bit outside [`Signals::USER_SIGNALS`] is rejected by
    /// `MojoEventSignal`/`MojoSignal`.
    #[inline]
    pub const fn is_subset_of_user_signals(self) -> bool {
        self.minus(Signals::USER_SIGNALS).is_empty()
    }
}

impl BitOr for Signals {
    type Output = Signals;
    #[inline]
    fn bitor(self, rhs: Signals) -> Signals {
        Signals(self.0 | rhs.0)
    }
}

impl BitOrAssign for Signals {
    #[inline]
    fn bitor_assign(&mut self, rhs: Signals) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for Signals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flags: &[(Signals, &str)] = &[
            (Signals::READABLE, "READABLE"),
            (Signals::WRITABLE, "WRITABLE"),
            (Signals::PEER_CLOSED, "PEER_CLOSED"),
            (Signals::READ_THRESHOLD, "READ_THRESHOLD"),
            (Signals::WRITE_THRESHOLD, "WRITE_THRESHOLD"),
            (Signals::SIGNAL0, "SIGNAL0"),
            (Signals::SIGNAL1, "SIGNAL1"),
            (Signals::SIGNAL2, "SIGNAL2"),
            (Signals::SIGNAL3, "SIGNAL3"),
            (Signals::SIGNAL4, "SIGNAL4"),
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

/// The `(satisfied, satisfiable)` pair every dispatcher exposes.
///
/// Invariant, enforced at construction: `satisfied ⊆ satisfiable`.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub struct SignalsState {
    satisfied: Signals,
    satisfiable: Signals,
}

impl SignalsState {
    pub fn new(satisfied: Signals, satisfiable: Signals) -> SignalsState {
        // Clamp defensively: satisfied can never claim a bit that isn't
        // satisfiable, even if a caller's bookkeeping slipped.
        SignalsState {
            satisfied: satisfied & satisfiable,
            satisfiable,
        }
    }

    pub fn satisfied(self) -> Signals {
        self.satisfied
    }

    pub fn satisfiable(self) -> Signals {
        self.satisfiable
    }
}

impl std::ops::BitAnd<Signals> for Signals {
    type Output = Signals;
    #[inline]
    fn bitand(self, rhs: Signals) -> Signals {
        Signals(self.0 & rhs.0)
    }
}
