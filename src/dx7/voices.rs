//! Note to voice bookkeeping

use crate::engine::VoiceHandle;

/// Number of MIDI notes
pub const NOTE_COUNT: usize = 128;

/// State of one note's slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Slot {
    #[default]
    Empty,
    Sounding(VoiceHandle),
}

/// At most one sounding voice per MIDI note
#[derive(Debug, Clone)]
pub struct VoiceTable {
    slots: [Slot; NOTE_COUNT],
}

impl Default for VoiceTable {
    fn default() -> Self {
        Self {
            slots: [Slot::Empty; NOTE_COUNT],
        }
    }
}

impl VoiceTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, note: u8) -> Slot {
        self.slots.get(note as usize).copied().unwrap_or_default()
    }

    /// Store a new voice for `note`, returning the one it replaces
    pub fn start(&mut self, note: u8, voice: VoiceHandle) -> Option<VoiceHandle> {
        let slot = self.slots.get_mut(note as usize)?;
        match std::mem::replace(slot, Slot::Sounding(voice)) {
            Slot::Sounding(previous) => Some(previous),
            Slot::Empty => None,
        }
    }

    /// Clear the slot for `note`, returning its voice
    pub fn release(&mut self, note: u8) -> Option<VoiceHandle> {
        let slot = self.slots.get_mut(note as usize)?;
        match std::mem::take(slot) {
            Slot::Sounding(voice) => Some(voice),
            Slot::Empty => None,
        }
    }

    /// Clear whichever slot still holds voice `id`
    pub fn forget(&mut self, id: i32) -> Option<u8> {
        let note = self
            .slots
            .iter()
            .position(|s| matches!(s, Slot::Sounding(v) if v.id == id))?;
        self.slots[note] = Slot::Empty;
        Some(note as u8)
    }

    /// Sounding voices in note order
    pub fn sounding(&self) -> impl Iterator<Item = (u8, VoiceHandle)> + '_ {
        self.slots.iter().enumerate().filter_map(|(note, slot)| match slot {
            Slot::Sounding(voice) => Some((note as u8, *voice)),
            Slot::Empty => None,
        })
    }

    /// Empty every slot, returning the voices that were sounding
    pub fn drain(&mut self) -> Vec<VoiceHandle> {
        let voices = self.sounding().map(|(_, v)| v).collect();
        self.slots = [Slot::Empty; NOTE_COUNT];
        voices
    }

    pub fn len(&self) -> usize {
        self.sounding().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn voice(id: i32) -> VoiceHandle {
        VoiceHandle { id }
    }

    #[test]
    fn test_start_and_release() {
        let mut table = VoiceTable::new();
        assert_eq!(table.start(60, voice(1)), None);
        assert_eq!(table.get(60), Slot::Sounding(voice(1)));
        assert_eq!(table.len(), 1);

        assert_eq!(table.release(60), Some(voice(1)));
        assert_eq!(table.get(60), Slot::Empty);
        assert_eq!(table.release(60), None);
        assert!(table.is_empty());
    }

    #[test]
    fn test_restart_replaces() {
        let mut table = VoiceTable::new();
        table.start(60, voice(1));
        assert_eq!(table.start(60, voice(2)), Some(voice(1)));
        assert_eq!(table.get(60), Slot::Sounding(voice(2)));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_forget_only_matching_id() {
        let mut table = VoiceTable::new();
        table.start(60, voice(1));
        table.start(60, voice(2));

        // the replaced voice ending must not clear the new one
        assert_eq!(table.forget(1), None);
        assert_eq!(table.get(60), Slot::Sounding(voice(2)));
        assert_eq!(table.forget(2), Some(60));
        assert!(table.is_empty());
    }

    #[test]
    fn test_out_of_range_note() {
        let mut table = VoiceTable::new();
        assert_eq!(table.start(200, voice(1)), None);
        assert_eq!(table.get(200), Slot::Empty);
        assert!(table.is_empty());
    }

    #[test]
    fn test_drain() {
        let mut table = VoiceTable::new();
        table.start(64, voice(2));
        table.start(60, voice(1));

        assert_eq!(table.drain(), vec![voice(1), voice(2)]);
        assert!(table.is_empty());
    }
}
