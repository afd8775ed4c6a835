//! Scripted keyboard input.
//!
//! Events are keyed by frame number and delivered to the key mailboxes at
//! the start of that frame. Key codes are PETSCII.

use std::collections::VecDeque;

use emu_core::Memory;

use crate::mailbox::Mailboxes;

/// PETSCII return.
pub const KEY_RETURN: u8 = 0x0D;

/// A timed keyboard event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputEvent {
    /// Frame number at which this event fires.
    pub frame: u64,
    pub code: u8,
    /// True = press, false = release.
    pub pressed: bool,
}

/// Timed input queue, sorted by frame. Events for the same frame keep the
/// order they were pushed in.
#[derive(Debug, Clone, Default)]
pub struct InputQueue {
    events: VecDeque<InputEvent>,
}

impl InputQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: InputEvent) {
        let pos = self
            .events
            .iter()
            .position(|e| e.frame > event.frame)
            .unwrap_or(self.events.len());
        self.events.insert(pos, event);
    }

    /// Press `code` at `at_frame` and release it `hold_frames` later.
    pub fn enqueue_key(&mut self, code: u8, at_frame: u64, hold_frames: u64) {
        self.push(InputEvent {
            frame: at_frame,
            code,
            pressed: true,
        });
        self.push(InputEvent {
            frame: at_frame + hold_frames,
            code,
            pressed: false,
        });
    }

    /// Type `text`, each character held 3 frames with a 3-frame gap.
    /// Characters without a key code are skipped. Returns the next free
    /// frame.
    pub fn enqueue_text(&mut self, text: &str, start_frame: u64) -> u64 {
        const HOLD: u64 = 3;
        const GAP: u64 = 3;
        let mut frame = start_frame;
        for code in text.chars().filter_map(petscii) {
            self.enqueue_key(code, frame, HOLD);
            frame += HOLD + GAP;
        }
        frame
    }

    /// Deliver every event due by `frame`.
    pub fn process(&mut self, frame: u64, mailboxes: &Mailboxes, memory: &mut Memory) {
        while let Some(event) = self.events.front().copied() {
            if event.frame > frame {
                break;
            }
            self.events.pop_front();
            mailboxes.key_event(memory, event.code, event.pressed);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

/// Unshifted PETSCII for a character: letters map to their uppercase
/// codes, digits and common punctuation map as in ASCII.
#[must_use]
pub fn petscii(ch: char) -> Option<u8> {
    match ch {
        'a'..='z' => Some(ch.to_ascii_uppercase() as u8),
        'A'..='Z' | ' '..='@' => Some(ch as u8),
        '\n' => Some(KEY_RETURN),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MailboxConfig;
    use emu_core::Bus;

    #[test]
    fn enqueue_key_creates_press_and_release() {
        let mut queue = InputQueue::new();
        queue.enqueue_key(b'A', 10, 3);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn enqueue_text_skips_unmapped_characters() {
        let mut queue = InputQueue::new();
        let next = queue.enqueue_text("a~b", 0);
        assert_eq!(next, 12);
        assert_eq!(queue.len(), 4);
    }

    #[test]
    fn same_frame_events_keep_push_order() {
        let mut queue = InputQueue::new();
        queue.enqueue_key(b'X', 5, 0);
        let events: Vec<_> = queue.events.iter().map(|e| e.pressed).collect();
        assert_eq!(events, vec![true, false]);
    }

    #[test]
    fn process_delivers_due_events_only() {
        let mailboxes = Mailboxes::new(MailboxConfig::default(), Some(1));
        let mut memory = Memory::new();
        mailboxes.install(&mut memory).expect("install");
        let mut queue = InputQueue::new();
        queue.enqueue_key(b'Q', 5, 3);

        queue.process(4, &mailboxes, &mut memory);
        assert_eq!(memory.peek(0xCF02), 0);

        queue.process(5, &mailboxes, &mut memory);
        assert_eq!(memory.peek(0xCF02), b'Q');
        assert_eq!(memory.read(0xCF01), b'Q');

        queue.process(8, &mailboxes, &mut memory);
        assert_eq!(memory.peek(0xCF02), 0);
        assert!(queue.is_empty());
    }

    #[test]
    fn petscii_mapping() {
        assert_eq!(petscii('h'), Some(b'H'));
        assert_eq!(petscii('?'), Some(b'?'));
        assert_eq!(petscii('\n'), Some(KEY_RETURN));
        assert_eq!(petscii('é'), None);
    }
}
