//! Two-phase consumption: reserve the head, then confirm or abandon it

use serde::{Deserialize, Serialize};

/// Delivery guarantee for consumed items
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Delivery {
    /// Reserving removes the entry from the store before the caller sees it.
    ///
    /// Confirming is in-memory only and abandoning writes the entry back. A
    /// crash while an item is reserved loses that item.
    #[default]
    AtMostOnce,

    /// Reserving only reads the entry; confirming removes it.
    ///
    /// A crash while an item is reserved delivers it again after restart.
    AtLeastOnce,
}

/// Observable consumer state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeState {
    Idle,
    Reserved { slot: u64 },
}

/// The head entry handed to the consumer but not yet confirmed
#[derive(Debug)]
pub(crate) struct Reservation<T> {
    pub slot: u64,
    pub value: T,
    /// Raw bytes, kept so the entry can be written back on abandon
    pub payload: Vec<u8>,
}

#[derive(Debug)]
pub(crate) enum ConsumerState<T> {
    Idle,
    Reserved(Reservation<T>),
}

impl<T> Default for ConsumerState<T> {
    fn default() -> Self {
        ConsumerState::Idle
    }
}

impl<T> ConsumerState<T> {
    pub fn reservation(&self) -> Option<&Reservation<T>> {
        match self {
            ConsumerState::Reserved(reservation) => Some(reservation),
            ConsumerState::Idle => None,
        }
    }

    pub fn take(&mut self) -> Option<Reservation<T>> {
        match std::mem::take(self) {
            ConsumerState::Reserved(reservation) => Some(reservation),
            ConsumerState::Idle => None,
        }
    }

    pub fn observe(&self) -> ConsumeState {
        match self {
            ConsumerState::Idle => ConsumeState::Idle,
            ConsumerState::Reserved(reservation) => ConsumeState::Reserved {
                slot: reservation.slot,
            },
        }
    }
}
