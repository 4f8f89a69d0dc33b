// SPDX-License-Identifier: GPL-3.0-or-later

// Instructions arrive as an opcode byte followed by an optional decimal
// argument. The argument ends on the next non numeric byte, which is kept
// as the next opcode, or when the line goes idle.

use embedded_hal::serial;
use heapless::String;

use crate::consts::protocol::*;
use crate::drivers::Board;
use crate::errors::Result;
use crate::util::retry_with_timeout;

use super::instruction::*;

fn is_numeric(byte: u8) -> bool {
    byte.is_ascii_digit() || byte == b'-' || byte == b'.'
}

pub struct InstructionReader<R> {
    serial: R,
    pending: Option<u8>,
}

impl<R: serial::Read<u8>> InstructionReader<R> {
    pub fn new(serial: R) -> Self {
        Self { serial, pending: None }
    }

    pub fn release(self) -> R {
        self.serial
    }

    fn try_read(&mut self) -> Option<u8> {
        self.pending.take().or_else(|| self.serial.read().ok())
    }

    fn read_with_timeout<B: Board>(&mut self, board: &mut B, attempts: u32, delay_us: u32) -> Result<u8> {
        if let Some(byte) = self.pending.take() {
            return Ok(byte);
        }
        let serial = &mut self.serial;
        retry_with_timeout(board, attempts, delay_us, || serial.read())
    }

    /// Discards what's left in the receive buffer.
    pub fn flush(&mut self) {
        self.pending = None;
        for _ in 0..MAX_FLUSH_BYTES {
            if self.serial.read().is_err() {
                break;
            }
        }
    }

    /// Reads the next instruction. `Ok(None)` when nothing came in, or when
    /// what came in is not an instruction.
    pub fn poll<B: Board>(&mut self, board: &mut B) -> Result<Option<Instruction>> {
        let opcode = match self.try_read() {
            Some(byte) => byte,
            None => return Ok(None),
        };

        match opcode {
            SPEEDS_OPCODE => self.read_speeds(board).map(Some),
            CONNECTING_BANNER => {
                board.delay_ms(BANNER_DRAIN_MS);
                self.flush();
                Ok(None)
            }
            b'\r' | b'\n' | b' ' => Ok(None),
            _ => {
                let arg = self.read_argument(board);
                Instruction::parse(opcode, &arg).map(Some).map_err(|e| {
                    warn!("Dropped instruction '{}' '{}': {:?}", opcode as char, arg.as_str(), e);
                    e
                })
            }
        }
    }

    fn read_speeds<B: Board>(&mut self, board: &mut B) -> Result<Instruction> {
        let mut payload = [0; SPEEDS_PAYLOAD_LEN];
        for byte in payload.iter_mut() {
            match self.read_with_timeout(board, PAYLOAD_POLL_ATTEMPTS, PAYLOAD_POLL_DELAY_US) {
                Ok(b) => *byte = b,
                Err(e) => {
                    warn!("Incomplete speed command, flushing input");
                    self.flush();
                    return Err(e);
                }
            }
        }
        Ok(Instruction::from_speeds_payload(payload))
    }

    fn read_argument<B: Board>(&mut self, board: &mut B) -> String<MAX_ARGUMENT_LENGTH> {
        let mut arg = String::new();
        while let Ok(byte) = self.read_with_timeout(board, ARGUMENT_IDLE_ATTEMPTS, ARGUMENT_POLL_DELAY_US) {
            if !is_numeric(byte) {
                self.pending = Some(byte);
                break;
            }
            // Extra digits are dropped.
            let _ = arg.push(byte as char);
        }
        arg
    }
}
