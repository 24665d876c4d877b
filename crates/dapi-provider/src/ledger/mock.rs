//! Scripted device for unit tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::apdu::{ApduAnswer, ApduCommand};
use super::session::{DeviceDescriptor, DeviceEnumerator, DeviceTransport};
use crate::error::{DeviceError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Present,
    Unsupported,
    Absent,
    FailingOpen,
}

#[derive(Debug, Default)]
struct State {
    answers: VecDeque<ApduAnswer>,
    sent: Vec<ApduCommand>,
    open_handles: usize,
    sessions: usize,
}

/// A device that replays canned answers and records every command.
#[derive(Debug, Clone)]
pub(crate) struct MockDevice {
    mode: Mode,
    state: Arc<Mutex<State>>,
}

impl MockDevice {
    pub(crate) fn new(answers: Vec<ApduAnswer>) -> Self {
        Self::with_mode(Mode::Present, answers)
    }

    pub(crate) fn unsupported() -> Self {
        Self::with_mode(Mode::Unsupported, vec![])
    }

    pub(crate) fn absent() -> Self {
        Self::with_mode(Mode::Absent, vec![])
    }

    pub(crate) fn failing_open() -> Self {
        Self::with_mode(Mode::FailingOpen, vec![])
    }

    fn with_mode(mode: Mode, answers: Vec<ApduAnswer>) -> Self {
        let state = State {
            answers: answers.into(),
            ..State::default()
        };
        Self {
            mode,
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub(crate) fn sent(&self) -> Vec<ApduCommand> {
        self.state.lock().unwrap().sent.clone()
    }

    pub(crate) fn open_handles(&self) -> usize {
        self.state.lock().unwrap().open_handles
    }

    pub(crate) fn sessions(&self) -> usize {
        self.state.lock().unwrap().sessions
    }
}

#[async_trait]
impl DeviceEnumerator for MockDevice {
    async fn is_supported(&self) -> bool {
        self.mode != Mode::Unsupported
    }

    async fn list(&self) -> Result<Vec<DeviceDescriptor>> {
        match self.mode {
            Mode::Absent | Mode::Unsupported => Ok(vec![]),
            Mode::Present | Mode::FailingOpen => Ok(vec![DeviceDescriptor {
                path: "mock-0".to_string(),
            }]),
        }
    }

    async fn open(&self, device: &DeviceDescriptor) -> Result<Box<dyn DeviceTransport>> {
        if self.mode == Mode::FailingOpen {
            return Err(DeviceError::OpenFailed(device.path.clone()).into());
        }

        let mut state = self.state.lock().unwrap();
        state.open_handles += 1;
        state.sessions += 1;
        Ok(Box::new(MockHandle {
            state: Arc::clone(&self.state),
        }))
    }
}

struct MockHandle {
    state: Arc<Mutex<State>>,
}

#[async_trait]
impl DeviceTransport for MockHandle {
    async fn exchange(&mut self, command: &ApduCommand) -> Result<ApduAnswer> {
        let mut state = self.state.lock().unwrap();
        state.sent.push(command.clone());
        state
            .answers
            .pop_front()
            .ok_or_else(|| DeviceError::Transport("no scripted answer".to_string()).into())
    }
}

impl Drop for MockHandle {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            state.open_handles -= 1;
        }
    }
}
