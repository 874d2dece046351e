//! Programmable-I/O state machine allocation
//!
//! The RP2040 has eight PIO state machines shared by everything that needs
//! precise pulse generation (the servo, the ZIP LEDs, and anything the
//! application adds). The allocator hands them out one at a time; a slot is
//! returned by giving its handle back.

use log::debug;

use super::BoardError;

pub const STATE_MACHINE_COUNT: usize = 8;

/// Claim on one state machine. Not `Clone`: whoever holds it owns the slot.
#[derive(Debug, PartialEq, Eq)]
pub struct StateMachineSlot {
    index: u8,
}

impl StateMachineSlot {
    pub fn index(&self) -> u8 {
        self.index
    }
}

#[derive(Debug, Default)]
pub struct StateMachineAllocator {
    used: [bool; STATE_MACHINE_COUNT],
}

impl StateMachineAllocator {
    pub const fn new() -> Self {
        Self {
            used: [false; STATE_MACHINE_COUNT],
        }
    }

    /// Marks a state machine as taken by code outside the allocator, such as
    /// a driver that claimed it directly.
    pub fn reserve(&mut self, index: u8) -> Result<(), BoardError> {
        let slot = self
            .used
            .get_mut(index as usize)
            .ok_or(BoardError::InvalidStateMachine { index })?;
        if *slot {
            return Err(BoardError::StateMachineInUse { index });
        }
        *slot = true;
        debug!("State machine {} reserved", index);
        Ok(())
    }

    /// Claims the lowest free state machine.
    pub fn claim(&mut self) -> Result<StateMachineSlot, BoardError> {
        let index = self
            .used
            .iter()
            .position(|used| !used)
            .ok_or(BoardError::NoFreeStateMachine)?;
        self.used[index] = true;
        debug!("State machine {} claimed", index);
        Ok(StateMachineSlot { index: index as u8 })
    }

    pub fn release(&mut self, slot: StateMachineSlot) {
        self.used[slot.index as usize] = false;
        debug!("State machine {} released", slot.index);
    }

    pub fn is_used(&self, index: u8) -> bool {
        self.used.get(index as usize).copied().unwrap_or(false)
    }

    pub fn free_count(&self) -> usize {
        self.used.iter().filter(|used| !**used).count()
    }
}
