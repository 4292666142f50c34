//! Paddle sampling and squeeze resolution

use crate::hal::PaddleContacts;
use crate::types::{Element, KeyerMode, PaddleSide, PaddleState};

/// Line levels of two released paddles (contacts pull the lines low)
pub const IDLE_LEVELS: u8 = 0x03;

/// Sampled paddle input as seen by the keying engine
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PaddleStatus {
    /// Element in progress: the last paddle element the keying engine
    /// started, or the one promoted by [`PaddleSampler::get_next`]
    pub current: Element,
    /// Element the current contacts ask for
    pub next: Element,
    /// A contact closed since the flag was last consumed
    pub touch: bool,
    pub mode: KeyerMode,
    /// Contacts after swap, as of the last change
    pub contacts: PaddleState,
}

impl PaddleStatus {
    pub const fn new(mode: KeyerMode) -> Self {
        Self {
            current: Element::None,
            next: Element::None,
            touch: false,
            mode,
            contacts: PaddleState::Free,
        }
    }

    /// Read and clear the sticky touch flag
    pub fn take_touch(&mut self) -> bool {
        core::mem::replace(&mut self.touch, false)
    }
}

/// Ultimatic hold arbitration: the most recently pressed paddle wins
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct UltimaticMemory {
    winner: Option<PaddleSide>,
    previous: PaddleState,
}

impl UltimaticMemory {
    pub const fn new() -> Self {
        Self {
            winner: None,
            previous: PaddleState::Free,
        }
    }

    /// Fold a new contact pattern into the memory and return the winning side
    pub fn resolve(&mut self, contacts: PaddleState) -> Option<PaddleSide> {
        let winner = match contacts {
            PaddleState::Free => None,
            PaddleState::Dit => Some(PaddleSide::Dit),
            PaddleState::Dah => Some(PaddleSide::Dah),
            PaddleState::Squeeze => match self.winner {
                // both closed at once
                None => Some(PaddleSide::Dah),
                Some(side) if !self.previous.has(side.opposite()) => Some(side.opposite()),
                Some(side) => Some(side),
            },
        };
        self.winner = winner;
        self.previous = contacts;
        winner
    }

    pub fn winner(&self) -> Option<PaddleSide> {
        self.winner
    }

    pub fn clear(&mut self) {
        *self = Self::new();
    }
}

/// Debounce-by-stability paddle sampler.
///
/// A sample only changes the status when its bit pattern differs from the
/// previous one; there is no debounce timer.
#[derive(Debug)]
pub struct PaddleSampler {
    status: PaddleStatus,
    last_bits: u8,
    ultimatic: UltimaticMemory,
    swap: bool,
}

impl PaddleSampler {
    pub const fn new(mode: KeyerMode) -> Self {
        Self {
            status: PaddleStatus::new(mode),
            last_bits: 0,
            ultimatic: UltimaticMemory::new(),
            swap: false,
        }
    }

    /// Read both contact lines and update the status.
    ///
    /// A failed read counts as both paddles released.
    pub fn check<P: PaddleContacts>(&mut self, paddles: &mut P) -> PaddleStatus {
        let levels = paddles.read_levels().unwrap_or(IDLE_LEVELS);
        self.sample(levels)
    }

    /// Update the status from raw line levels (bit 0 left, bit 1 right, idle high)
    pub fn sample(&mut self, levels: u8) -> PaddleStatus {
        let mut contacts = PaddleState::from_bits(levels ^ IDLE_LEVELS);
        if self.swap {
            contacts = contacts.swapped();
        }

        let bits = contacts.bits();
        if bits == self.last_bits {
            return self.status;
        }
        self.last_bits = bits;
        self.status.contacts = contacts;

        if !contacts.is_free() {
            self.status.touch = true;
        }

        match self.status.mode {
            KeyerMode::Ultimatic => {
                self.status.next = self
                    .ultimatic
                    .resolve(contacts)
                    .map(|side| side.to_element())
                    .unwrap_or(Element::None);
            }
            KeyerMode::IambicA | KeyerMode::IambicB => match contacts {
                PaddleState::Free => {
                    if self.status.mode == KeyerMode::IambicA {
                        self.status.next = Element::None;
                    }
                }
                PaddleState::Squeeze => {
                    self.status.next = Element::alternate(self.status.current);
                }
                single => {
                    if let Some(side) = single.single() {
                        self.status.next = side.to_element();
                    }
                }
            },
        }

        self.status
    }

    /// Promote the queued element and return the status it produced.
    ///
    /// For callers that pull elements from the sampler directly. The keying
    /// engine resolves Iambic squeezes from `contacts` and its own history
    /// and writes the element it starts back into `current` instead.
    pub fn get_next(&mut self) -> PaddleStatus {
        self.status.current = self.status.next;
        let promoted = self.status;
        if self.status.contacts.is_squeeze() && self.status.mode.alternates() {
            self.status.next = Element::alternate(self.status.current);
        }
        self.status.current = Element::None;
        promoted
    }

    /// Switch squeeze policy; all transient memory is dropped on a change
    pub fn set_mode(&mut self, mode: KeyerMode) {
        if self.status.mode == mode {
            return;
        }
        self.status = PaddleStatus::new(mode);
        self.last_bits = 0;
        self.ultimatic.clear();
    }

    pub fn set_swap(&mut self, swap: bool) {
        self.swap = swap;
    }

    pub fn swap(&self) -> bool {
        self.swap
    }

    pub fn mode(&self) -> KeyerMode {
        self.status.mode
    }

    pub fn status(&self) -> PaddleStatus {
        self.status
    }

    /// Status handed to the keying engine, which consumes the touch flag
    pub fn status_mut(&mut self) -> &mut PaddleStatus {
        &mut self.status
    }
}
