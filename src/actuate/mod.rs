//! Actuation boundary.
//!
//! - `Actuator`: the motor driver, two fire-and-forget commands
//! - `ActuatorSession`: scoped guard owning the actuator and the current
//!   `ActuationState`; it commands a stop when created and again when dropped,
//!   so every exit path (return, `?`, panic unwinding) leaves the vehicle
//!   stopped
//!
//! Drivers: `LogActuator` (dry run) and `LineActuator` (line protocol over any
//! writer, e.g. a serial device), selected by `open_actuator`.

mod line;

pub use line::{LineActuator, LogActuator};

use std::fs::OpenOptions;

use crate::error::ActuatorError;

/// Actuator target that selects the dry-run driver.
pub const DRY_RUN_TARGET: &str = "log";

/// Open the driver for a configured target: `log`, or a path (serial device
/// node, FIFO, plain file) that receives the line protocol.
pub fn open_actuator(target: &str) -> Result<Box<dyn Actuator>, ActuatorError> {
    if target == DRY_RUN_TARGET {
        return Ok(Box::new(LogActuator::new()));
    }
    let device = OpenOptions::new().append(true).create(false).open(target)?;
    log::info!("actuator: line protocol on {}", target);
    Ok(Box::new(LineActuator::new(device)))
}

/// Motor driver.
///
/// Both commands are assumed idempotent and must not block for long.
pub trait Actuator {
    /// Drive forward at `speed` percent of full power.
    fn forward(&mut self, speed: u8) -> Result<(), ActuatorError>;

    fn stop(&mut self) -> Result<(), ActuatorError>;
}

impl<A: Actuator + ?Sized> Actuator for Box<A> {
    fn forward(&mut self, speed: u8) -> Result<(), ActuatorError> {
        (**self).forward(speed)
    }

    fn stop(&mut self) -> Result<(), ActuatorError> {
        (**self).stop()
    }
}

impl<A: Actuator + ?Sized> Actuator for &mut A {
    fn forward(&mut self, speed: u8) -> Result<(), ActuatorError> {
        (**self).forward(speed)
    }

    fn stop(&mut self) -> Result<(), ActuatorError> {
        (**self).stop()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActuationState {
    Moving,
    Stopped,
}

/// A command as sent to the driver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Forward(u8),
    Stop,
}

impl Command {
    pub fn state(self) -> ActuationState {
        match self {
            Command::Forward(_) => ActuationState::Moving,
            Command::Stop => ActuationState::Stopped,
        }
    }
}

/// Owns the actuator for the lifetime of a control run.
pub struct ActuatorSession<A: Actuator> {
    actuator: A,
    state: ActuationState,
    commands_sent: u64,
    released: bool,
}

impl<A: Actuator> ActuatorSession<A> {
    /// Take ownership of the actuator and command an initial stop.
    ///
    /// If that first stop cannot be delivered the session is not created.
    pub fn start(actuator: A) -> Result<Self, ActuatorError> {
        let mut session = Self {
            actuator,
            state: ActuationState::Stopped,
            commands_sent: 0,
            released: false,
        };
        session.send(Command::Stop)?;
        log::info!("actuator session started (stopped)");
        Ok(session)
    }

    pub fn state(&self) -> ActuationState {
        self.state
    }

    pub fn commands_sent(&self) -> u64 {
        self.commands_sent
    }

    /// Send a command, re-issuing it even when the state is unchanged.
    pub fn send(&mut self, command: Command) -> Result<(), ActuatorError> {
        let previous = self.state;
        let result = match command {
            Command::Forward(speed) => self.actuator.forward(speed),
            Command::Stop => self.actuator.stop(),
        };
        self.commands_sent += 1;
        match result {
            Ok(()) => {
                self.state = command.state();
                if previous != self.state {
                    log::info!("actuation {:?} -> {:?}", previous, self.state);
                }
                Ok(())
            }
            Err(err) => {
                // Physical state unknown; treat as moving until a stop lands.
                self.state = ActuationState::Moving;
                Err(err)
            }
        }
    }

    /// Stop and release the actuator, reporting whether the final stop landed.
    ///
    /// When the stop fails, dropping the session tries once more.
    pub fn finish(mut self) -> Result<(), ActuatorError> {
        self.send(Command::Stop)?;
        self.released = true;
        log::info!("actuator session finished (stopped)");
        Ok(())
    }
}

impl<A: Actuator> Drop for ActuatorSession<A> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        match self.actuator.stop() {
            Ok(()) => {
                self.state = ActuationState::Stopped;
                log::info!("actuator session released (stopped)");
            }
            Err(err) => log::error!("failed to stop actuator on release: {}", err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Clone, Default)]
    struct Recorder {
        commands: Rc<RefCell<Vec<Command>>>,
        fail_forward: bool,
    }

    impl Actuator for Recorder {
        fn forward(&mut self, speed: u8) -> Result<(), ActuatorError> {
            self.commands.borrow_mut().push(Command::Forward(speed));
            if self.fail_forward {
                return Err(ActuatorError::Rejected("motor fault".to_string()));
            }
            Ok(())
        }

        fn stop(&mut self) -> Result<(), ActuatorError> {
            self.commands.borrow_mut().push(Command::Stop);
            Ok(())
        }
    }

    #[test]
    fn dry_run_target_needs_no_device() {
        let mut actuator = open_actuator(DRY_RUN_TARGET).expect("dry run actuator");
        actuator.forward(20).expect("forward");
        actuator.stop().expect("stop");
    }

    #[test]
    fn missing_device_is_an_io_error() {
        assert!(matches!(
            open_actuator("/nonexistent/watchstop-motor"),
            Err(ActuatorError::Io(_))
        ));
    }

    #[test]
    fn session_stops_on_start_and_drop() {
        let recorder = Recorder::default();
        let log = recorder.commands.clone();
        {
            let mut session = ActuatorSession::start(recorder).expect("start session");
            assert_eq!(session.state(), ActuationState::Stopped);
            session.send(Command::Forward(20)).expect("forward");
            assert_eq!(session.state(), ActuationState::Moving);
        }
        assert_eq!(
            *log.borrow(),
            vec![Command::Stop, Command::Forward(20), Command::Stop]
        );
    }

    #[test]
    fn finish_stops_exactly_once() {
        let recorder = Recorder::default();
        let log = recorder.commands.clone();
        let mut session = ActuatorSession::start(recorder).expect("start session");
        session.send(Command::Forward(35)).expect("forward");
        session.finish().expect("finish");
        assert_eq!(
            *log.borrow(),
            vec![Command::Stop, Command::Forward(35), Command::Stop]
        );
    }

    #[test]
    fn repeated_commands_are_reissued() {
        let recorder = Recorder::default();
        let log = recorder.commands.clone();
        let mut session = ActuatorSession::start(recorder).expect("start session");
        session.send(Command::Stop).expect("stop");
        session.send(Command::Stop).expect("stop");
        assert_eq!(session.commands_sent(), 3);
        drop(session);
        assert_eq!(log.borrow().len(), 4);
    }

    #[test]
    fn failed_command_still_stops_on_drop() {
        let recorder = Recorder {
            fail_forward: true,
            ..Recorder::default()
        };
        let log = recorder.commands.clone();
        {
            let mut session = ActuatorSession::start(recorder).expect("start session");
            assert!(session.send(Command::Forward(20)).is_err());
            assert_eq!(session.state(), ActuationState::Moving);
        }
        assert_eq!(log.borrow().last(), Some(&Command::Stop));
    }
}
