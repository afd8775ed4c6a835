//! Voice state machine.
//!
//! Transitions are derived from register deltas at each end of frame.

use crate::registers::{VoiceDeltas, VoiceRegisters};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum VoiceStatus {
    #[default]
    Stopped,
    AttackDecaySustainStarted,
    ReleaseStarted,
}

impl VoiceStatus {
    /// An envelope cycle (ADS or release) is running.
    #[must_use]
    pub fn is_active(self) -> bool {
        self != Self::Stopped
    }
}

/// Commands a voice emits for its envelope and oscillator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VoiceCommand {
    StartAttackDecaySustain,
    StartRelease,
    Stop,
    ChangeFrequency,
    ChangePulseWidth,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VoiceState {
    status: VoiceStatus,
}

impl VoiceState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn status(&self) -> VoiceStatus {
        self.status
    }

    /// Derive this frame's commands from the voice's registers and what
    /// changed in them.
    pub fn update(&mut self, regs: &VoiceRegisters, deltas: VoiceDeltas) -> Vec<VoiceCommand> {
        let mut commands = Vec::new();
        if deltas.control {
            let next = match (regs.waveform_selected(), regs.gate(), self.status) {
                (
                    true,
                    true,
                    VoiceStatus::Stopped | VoiceStatus::AttackDecaySustainStarted,
                ) => Some((
                    VoiceCommand::StartAttackDecaySustain,
                    VoiceStatus::AttackDecaySustainStarted,
                )),
                (true, false, VoiceStatus::AttackDecaySustainStarted) => {
                    Some((VoiceCommand::StartRelease, VoiceStatus::ReleaseStarted))
                }
                (false, false, _) => Some((VoiceCommand::Stop, VoiceStatus::Stopped)),
                _ => None,
            };
            if let Some((command, status)) = next {
                commands.push(command);
                self.status = status;
            }
        }

        // A fresh start already picks up the current pitch
        let started = commands.contains(&VoiceCommand::StartAttackDecaySustain);
        if self.status.is_active() && !started {
            if deltas.frequency {
                commands.push(VoiceCommand::ChangeFrequency);
            }
            if deltas.pulse_width {
                commands.push(VoiceCommand::ChangePulseWidth);
            }
        }
        commands
    }

    /// The release phase ran out.
    pub fn release_finished(&mut self) {
        if self.status == VoiceStatus::ReleaseStarted {
            self.status = VoiceStatus::Stopped;
        }
    }
}
