//! MIDI input for the synthesizer.
//!
//! Reads note and control change messages from a MIDI port and hands them
//! to the session on a single dispatcher thread, in arrival order.

use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::{anyhow, Result};
use midir::{Ignore, MidiInput, MidiInputConnection};

use crate::dx7::{Ctrl, Dx7, Note};

/// MIDI message types the synthesizer responds to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiMessage {
    /// Note on: channel (0-15), note (0-127), velocity (0-127)
    NoteOn(u8, u8, u8),
    /// Note off: channel (0-15), note (0-127), velocity (0-127)
    NoteOff(u8, u8, u8),
    /// Control change: channel (0-15), controller (0-127), value (0-127)
    ControlChange(u8, u8, u8),
}

impl MidiMessage {
    /// Parse raw MIDI bytes, ignoring messages the synthesizer does not use.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let (&status, data) = bytes.split_first()?;
        let ch = status & 0x0F;
        let data1 = *data.first()? & 0x7F;
        let data2 = *data.get(1)? & 0x7F;
        match status & 0xF0 {
            0x90 => Some(MidiMessage::NoteOn(ch, data1, data2)),
            0x80 => Some(MidiMessage::NoteOff(ch, data1, data2)),
            0xB0 => Some(MidiMessage::ControlChange(ch, data1, data2)),
            _ => None,
        }
    }

    /// Channel the message was sent on.
    pub fn channel(&self) -> u8 {
        match *self {
            MidiMessage::NoteOn(ch, _, _)
            | MidiMessage::NoteOff(ch, _, _)
            | MidiMessage::ControlChange(ch, _, _) => ch,
        }
    }
}

/// Deliver one message to the session.
///
/// Errors are logged; a bad event never stops the input.
pub fn dispatch(dx7: &Dx7, msg: MidiMessage) {
    let result = match msg {
        MidiMessage::NoteOn(_, note, velocity) => dx7.on_note(Some(Note::on(note, velocity))),
        MidiMessage::NoteOff(_, note, _) => dx7.on_note(Some(Note::off(note))),
        MidiMessage::ControlChange(_, num, value) => {
            dx7.on_control(Some(Ctrl::new(num, value))).map(|_| ())
        }
    };
    if let Err(e) = result {
        log::warn!("{:?}: {}", msg, e);
    }
}

/// Open connection to a MIDI input port.
pub struct MidiListener {
    connection: Option<MidiInputConnection<Sender<MidiMessage>>>,
    dispatcher: Option<JoinHandle<()>>,
    port_name: String,
}

impl MidiListener {
    /// Connect to the first port whose name contains `port_name`, or the
    /// first port, and start forwarding messages on `channel` (all if None).
    pub fn start(port_name: Option<&str>, channel: Option<u8>, dx7: Arc<Dx7>) -> Result<Self> {
        let mut midi_in = MidiInput::new("dx7 input")?;
        midi_in.ignore(Ignore::All);
        let ports = midi_in.ports();

        if ports.is_empty() {
            return Err(anyhow!("No MIDI input ports available"));
        }

        let port = if let Some(name) = port_name {
            ports
                .iter()
                .find(|p| {
                    midi_in
                        .port_name(p)
                        .map(|n| n.contains(name))
                        .unwrap_or(false)
                })
                .ok_or_else(|| anyhow!("MIDI port '{}' not found", name))?
                .clone()
        } else {
            ports[0].clone()
        };

        let port_name_actual = midi_in.port_name(&port)?;
        let (sender, receiver) = mpsc::channel::<MidiMessage>();

        // Spawn thread to dispatch MIDI messages
        let dispatcher = thread::Builder::new()
            .name("midi-dispatch".to_string())
            .spawn(move || {
                while let Ok(msg) = receiver.recv() {
                    dispatch(&dx7, msg);
                }
                log::debug!("MIDI dispatcher stopped");
            })?;

        let connection = midi_in
            .connect(
                &port,
                "dx7-input",
                move |_stamp, bytes, sender| {
                    let Some(msg) = MidiMessage::from_bytes(bytes) else {
                        return;
                    };
                    if channel.map_or(true, |ch| ch == msg.channel()) {
                        let _ = sender.send(msg);
                    }
                },
                sender,
            )
            .map_err(|e| anyhow!("connecting to '{}': {}", port_name_actual, e))?;

        log::info!("MIDI input connected to: {}", port_name_actual);

        Ok(Self {
            connection: Some(connection),
            dispatcher: Some(dispatcher),
            port_name: port_name_actual,
        })
    }

    /// Name of the connected port.
    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    /// Close the port and wait for pending messages to be dispatched.
    pub fn stop(&mut self) {
        // Closing drops the sender, which ends the dispatcher
        if let Some(connection) = self.connection.take() {
            connection.close();
        }
        if let Some(dispatcher) = self.dispatcher.take() {
            let _ = dispatcher.join();
        }
    }
}

impl Drop for MidiListener {
    fn drop(&mut self) {
        self.stop();
    }
}

/// List available MIDI input ports.
pub fn list_midi_ports() -> Result<Vec<String>> {
    let midi_in = MidiInput::new("dx7 list")?;
    let ports = midi_in.ports();

    let names: Vec<String> = ports
        .iter()
        .filter_map(|p| midi_in.port_name(p).ok())
        .collect();

    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Dx7Config;
    use crate::engine::testing::RecordingEngine;

    #[test]
    fn test_parse_note_on() {
        assert_eq!(
            MidiMessage::from_bytes(&[0x90, 60, 100]),
            Some(MidiMessage::NoteOn(0, 60, 100))
        );
    }

    #[test]
    fn test_parse_note_on_channel() {
        let msg = MidiMessage::from_bytes(&[0x95, 72, 80]).unwrap();
        assert_eq!(msg, MidiMessage::NoteOn(5, 72, 80));
        assert_eq!(msg.channel(), 5);
    }

    #[test]
    fn test_parse_note_off() {
        assert_eq!(MidiMessage::from_bytes(&[0x80, 60, 0]), Some(MidiMessage::NoteOff(0, 60, 0)));
    }

    #[test]
    fn test_parse_cc() {
        assert_eq!(
            MidiMessage::from_bytes(&[0xB0, 106, 64]),
            Some(MidiMessage::ControlChange(0, 106, 64))
        );
    }

    #[test]
    fn test_parse_ignored() {
        // program change, pitch bend, truncated, empty
        assert_eq!(MidiMessage::from_bytes(&[0xC0, 42]), None);
        assert_eq!(MidiMessage::from_bytes(&[0xE0, 0, 0x40]), None);
        assert_eq!(MidiMessage::from_bytes(&[0x90, 60]), None);
        assert_eq!(MidiMessage::from_bytes(&[]), None);
    }

    #[test]
    fn test_dispatch_keeps_going() {
        let engine = Arc::new(RecordingEngine::new());
        let dx7 = Dx7::new(engine.clone(), &Dx7Config::default());
        dx7.select_algorithm(1).unwrap();

        // note off without note on only logs
        dispatch(&dx7, MidiMessage::NoteOff(0, 61, 0));
        dispatch(&dx7, MidiMessage::NoteOn(0, 60, 100));
        dispatch(&dx7, MidiMessage::NoteOn(0, 60, 0));

        assert_eq!(engine.starts().len(), 1);
        assert_eq!(engine.sets().len(), 1);
        assert!(dx7.voices().is_empty());
    }
}
