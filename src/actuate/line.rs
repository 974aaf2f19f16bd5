use std::io::Write;

use super::Actuator;
use crate::error::ActuatorError;

/// Dry-run driver: logs every command and moves nothing.
#[derive(Debug, Default)]
pub struct LogActuator {
    last: Option<String>,
}

impl LogActuator {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&mut self, command: String) {
        if self.last.as_deref() != Some(command.as_str()) {
            log::info!("actuator (dry run): {}", command);
        } else {
            log::debug!("actuator (dry run): {}", command);
        }
        self.last = Some(command);
    }
}

impl Actuator for LogActuator {
    fn forward(&mut self, speed: u8) -> Result<(), ActuatorError> {
        self.record(format!("FORWARD {}", speed));
        Ok(())
    }

    fn stop(&mut self) -> Result<(), ActuatorError> {
        self.record("STOP".to_string());
        Ok(())
    }
}

/// Line-protocol driver for a motor controller on a serial link.
///
/// Each command is one newline-terminated ASCII line, flushed immediately:
/// `FORWARD <speed>` or `STOP`.
pub struct LineActuator<W: Write> {
    writer: W,
}

impl<W: Write> LineActuator<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_line(&mut self, line: &str) -> Result<(), ActuatorError> {
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

impl<W: Write> Actuator for LineActuator<W> {
    fn forward(&mut self, speed: u8) -> Result<(), ActuatorError> {
        if speed > 100 {
            return Err(ActuatorError::Rejected(format!(
                "speed {} exceeds 100%",
                speed
            )));
        }
        self.write_line(&format!("FORWARD {}", speed))
    }

    fn stop(&mut self) -> Result<(), ActuatorError> {
        self.write_line("STOP")
    }
}
