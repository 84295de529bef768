//! A scriptable stand-in for the I2C bus, for tests.

use embedded_hal::i2c::{ErrorKind, ErrorType, I2c, NoAcknowledgeSource, Operation};
use std::vec::Vec;

/// Records every write and answers register reads from a table.
#[derive(Debug, Default)]
pub struct FakeBus {
    /// Every write, in order: address and bytes. Failed writes are recorded too.
    pub writes: Vec<(u8, Vec<u8>)>,
    /// Addresses nobody answers at.
    pub absent: Vec<u8>,
    /// Addresses that acknowledge but refuse any data byte.
    pub refuse_data: Vec<u8>,
    /// Register contents served to reads: address, register pointer, value.
    pub registers: Vec<(u8, u8, u16)>,
    /// Number of reads served.
    pub reads: usize,
}

impl FakeBus {
    /// Writes which went to `address`.
    pub fn writes_to(&self, address: u8) -> Vec<Vec<u8>> {
        self.writes
            .iter()
            .filter(|(a, _)| *a == address)
            .map(|(_, bytes)| bytes.clone())
            .collect()
    }

    /// Replaces (or adds) the value served for `register` at `address`.
    pub fn set_register(&mut self, address: u8, register: u8, value: u16) {
        self.registers
            .retain(|&(a, r, _)| !(a == address && r == register));
        self.registers.push((address, register, value));
    }

    fn register(&self, address: u8, register: u8) -> u16 {
        self.registers
            .iter()
            .find(|&&(a, r, _)| a == address && r == register)
            .map_or(0, |&(_, _, value)| value)
    }
}

impl ErrorType for FakeBus {
    type Error = ErrorKind;
}

impl I2c for FakeBus {
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        let mut pointer = 0;
        for operation in operations {
            match operation {
                Operation::Write(bytes) => {
                    self.writes.push((address, Vec::from(*bytes)));
                    if self.absent.contains(&address) {
                        return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
                    }
                    if !bytes.is_empty() && self.refuse_data.contains(&address) {
                        return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Data));
                    }
                    if let Some(&first) = bytes.first() {
                        pointer = first;
                    }
                }
                Operation::Read(buffer) => {
                    if self.absent.contains(&address) {
                        return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
                    }
                    self.reads += 1;
                    let value = self.register(address, pointer).to_be_bytes();
                    for (byte, v) in buffer.iter_mut().zip(value.iter()) {
                        *byte = *v;
                    }
                }
            }
        }
        Ok(())
    }
}
