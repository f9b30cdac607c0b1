//! [`BusManager`]: bundles a write engine and a read engine for callers that
//! want the combined surface of both.

use crate::attributes::Attributes;
use crate::channel::{AddressChannel, BBeat, BusGeometry, RBeat, ReadChannels, ResponseChannel, WriteChannels, WriteDataChannel};
use crate::engine::read::ReadEngine;
use crate::engine::write::WriteEngine;
use crate::error::CallerError;
use crate::model::{ReadRequest, ReadResult, ResponseCode, WriteRequest, WriteResult};
use crate::token::Token;

/// Bundles a [`WriteEngine`] and a [`ReadEngine`] against the same bus
/// geometry, exposing the union of both engines' caller APIs plus a
/// conjoined [`Self::idle`]/[`Self::wait_idle`].
///
/// The two engines share no state — see each engine's module docs — so this
/// type is a thin convenience wrapper, not a coordination point. Read and
/// write traffic have no ordering relationship to each other.
pub struct BusManager {
    write: WriteEngine,
    read: ReadEngine,
}

impl BusManager {
    /// Spawns a combined manager: a write engine over `write_channels` and a
    /// read engine over `read_channels`, both sized per `geometry`.
    pub fn new<AW, W, B, AR, R>(geometry: BusGeometry, write_channels: WriteChannels<AW, W, B>, read_channels: ReadChannels<AR, R>) -> Self
    where
        AW: AddressChannel + Send + 'static,
        W: WriteDataChannel + Send + 'static,
        B: ResponseChannel<Beat = BBeat> + Send + 'static,
        AR: AddressChannel + Send + 'static,
        R: ResponseChannel<Beat = RBeat> + Send + 'static,
    {
        Self {
            write: WriteEngine::new(geometry, write_channels),
            read: ReadEngine::new(geometry, read_channels),
        }
    }

    /// Submits a write request, returning its token immediately. See
    /// [`WriteEngine::submit`].
    ///
    /// # Errors
    ///
    /// See [`WriteEngine::submit`].
    pub fn submit_write(&self, request: WriteRequest) -> Result<Token, CallerError> {
        self.write.submit(request)
    }

    /// Submits a read request, returning its token immediately. See
    /// [`ReadEngine::submit`].
    ///
    /// # Errors
    ///
    /// See [`ReadEngine::submit`].
    pub fn submit_read(&self, request: ReadRequest) -> Result<Token, CallerError> {
        self.read.submit(request)
    }

    /// Submits `data` at `address` and blocks for the result. See
    /// [`WriteEngine::write`].
    ///
    /// # Errors
    ///
    /// See [`WriteEngine::write`].
    pub fn write(&self, address: u64, data: Vec<u8>, attrs: Attributes) -> Result<(usize, ResponseCode), CallerError> {
        self.write.write(address, data, attrs)
    }

    /// Reads `length` bytes at `address` and blocks for the result. See
    /// [`ReadEngine::read`].
    ///
    /// # Errors
    ///
    /// See [`ReadEngine::read`].
    pub fn read(&self, address: u64, length: usize, attrs: Attributes) -> Result<(Vec<u8>, ResponseCode), CallerError> {
        self.read.read(address, length, attrs)
    }

    /// Writes `words.len()` little-endian words of `word_size` bytes each,
    /// starting at `address`, composed atop [`Self::write`].
    ///
    /// # Errors
    ///
    /// See [`Self::write`].
    pub fn write_words(&self, address: u64, words: &[u64], word_size: usize, attrs: Attributes) -> Result<ResponseCode, CallerError> {
        let mut data = Vec::with_capacity(words.len() * word_size);
        for word in words {
            data.extend_from_slice(&word.to_le_bytes()[..word_size]);
        }
        let (_, response) = self.write(address, data, attrs)?;
        Ok(response)
    }

    /// Writes a single little-endian word of `word_size` bytes at `address`.
    ///
    /// # Errors
    ///
    /// See [`Self::write_words`].
    pub fn write_word(&self, address: u64, value: u64, word_size: usize, attrs: Attributes) -> Result<ResponseCode, CallerError> {
        self.write_words(address, &[value], word_size, attrs)
    }

    /// Reads `count` little-endian words of `word_size` bytes each, starting
    /// at `address`, composed atop [`Self::read`].
    ///
    /// # Errors
    ///
    /// See [`Self::read`].
    pub fn read_words(&self, address: u64, count: usize, word_size: usize, attrs: Attributes) -> Result<(Vec<u64>, ResponseCode), CallerError> {
        let (data, response) = self.read(address, count * word_size, attrs)?;
        let mut words = Vec::with_capacity(count);
        for chunk in data.chunks_exact(word_size) {
            let mut buf = [0u8; 8];
            buf[..word_size].copy_from_slice(chunk);
            words.push(u64::from_le_bytes(buf));
        }
        Ok((words, response))
    }

    /// Reads a single little-endian word of `word_size` bytes at `address`.
    ///
    /// # Errors
    ///
    /// See [`Self::read_words`].
    pub fn read_word(&self, address: u64, word_size: usize, attrs: Attributes) -> Result<(u64, ResponseCode), CallerError> {
        let (words, response) = self.read_words(address, 1, word_size, attrs)?;
        Ok((words[0], response))
    }

    /// Writes a single byte at `address`. Named parity with the source's
    /// `write_byte`/`write_word`/`write_dword`/`write_qword` family.
    ///
    /// # Errors
    ///
    /// See [`Self::write_word`].
    pub fn write_byte(&self, address: u64, value: u8, attrs: Attributes) -> Result<ResponseCode, CallerError> {
        self.write_word(address, u64::from(value), 1, attrs)
    }

    /// Writes a single little-endian 16-bit word at `address`.
    ///
    /// # Errors
    ///
    /// See [`Self::write_word`].
    pub fn write_hword(&self, address: u64, value: u16, attrs: Attributes) -> Result<ResponseCode, CallerError> {
        self.write_word(address, u64::from(value), 2, attrs)
    }

    /// Writes a single little-endian 32-bit word at `address`.
    ///
    /// # Errors
    ///
    /// See [`Self::write_word`].
    pub fn write_dword(&self, address: u64, value: u32, attrs: Attributes) -> Result<ResponseCode, CallerError> {
        self.write_word(address, u64::from(value), 4, attrs)
    }

    /// Writes a single little-endian 64-bit word at `address`.
    ///
    /// # Errors
    ///
    /// See [`Self::write_word`].
    pub fn write_qword(&self, address: u64, value: u64, attrs: Attributes) -> Result<ResponseCode, CallerError> {
        self.write_word(address, value, 8, attrs)
    }

    /// Reads a single byte at `address`. Named parity with the source's
    /// `read_byte`/`read_word`/`read_dword`/`read_qword` family.
    ///
    /// # Errors
    ///
    /// See [`Self::read_word`].
    pub fn read_byte(&self, address: u64, attrs: Attributes) -> Result<(u8, ResponseCode), CallerError> {
        #[allow(clippy::cast_possible_truncation)]
        let (value, response) = self.read_word(address, 1, attrs)?;
        Ok((value as u8, response))
    }

    /// Reads a single little-endian 16-bit word at `address`.
    ///
    /// # Errors
    ///
    /// See [`Self::read_word`].
    pub fn read_hword(&self, address: u64, attrs: Attributes) -> Result<(u16, ResponseCode), CallerError> {
        #[allow(clippy::cast_possible_truncation)]
        let (value, response) = self.read_word(address, 2, attrs)?;
        Ok((value as u16, response))
    }

    /// Reads a single little-endian 32-bit word at `address`.
    ///
    /// # Errors
    ///
    /// See [`Self::read_word`].
    pub fn read_dword(&self, address: u64, attrs: Attributes) -> Result<(u32, ResponseCode), CallerError> {
        #[allow(clippy::cast_possible_truncation)]
        let (value, response) = self.read_word(address, 4, attrs)?;
        Ok((value as u32, response))
    }

    /// Reads a single little-endian 64-bit word at `address`.
    ///
    /// # Errors
    ///
    /// See [`Self::read_word`].
    pub fn read_qword(&self, address: u64, attrs: Attributes) -> Result<(u64, ResponseCode), CallerError> {
        self.read_word(address, 8, attrs)
    }

    /// Whether neither engine has a request in flight.
    #[must_use]
    pub fn idle(&self) -> bool {
        self.write.idle() && self.read.idle()
    }

    /// Blocks until neither engine has a request in flight.
    pub fn wait_idle(&self) {
        self.write.wait_idle();
        self.read.wait_idle();
    }

    /// Blocks until the write engine has no request in flight.
    pub fn wait_write_idle(&self) {
        self.write.wait_idle();
    }

    /// Blocks until the read engine has no request in flight.
    pub fn wait_read_idle(&self) {
        self.read.wait_idle();
    }

    /// Removes and returns a completed write result if ready, without
    /// blocking.
    pub fn take_write_result(&self, token: Token) -> Option<Result<WriteResult, CallerError>> {
        self.write.take_result(token)
    }

    /// Removes and returns a completed read result if ready, without
    /// blocking.
    pub fn take_read_result(&self, token: Token) -> Option<Result<ReadResult, CallerError>> {
        self.read.take_result(token)
    }

    /// Blocks until `token`'s write result is ready, then removes and
    /// returns it.
    pub fn await_write_result(&self, token: Token) -> Result<WriteResult, CallerError> {
        self.write.await_result(token)
    }

    /// Blocks until `token`'s read result is ready, then removes and returns
    /// it.
    pub fn await_read_result(&self, token: Token) -> Result<ReadResult, CallerError> {
        self.read.await_result(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{AddressTransaction, ReadChannels, WriteBeat, WriteChannels};
    use std::collections::HashMap;
    use std::sync::mpsc::{self, Receiver, Sender};
    use std::sync::{Arc, Mutex};

    struct MockAw {
        cursor: Arc<Mutex<HashMap<u32, u64>>>,
    }
    impl AddressChannel for MockAw {
        fn post(&self, txn: AddressTransaction) -> Result<(), crate::error::ChannelError> {
            self.cursor.lock().unwrap().insert(txn.id, txn.address);
            Ok(())
        }
    }

    /// Writes each beat's strobed lanes into shared `memory` at the cursor
    /// address tracked from the matching AW, advancing by `byte_width` per
    /// beat, and acks via `b_tx` once the burst's last beat lands.
    struct MockW {
        cursor: Arc<Mutex<HashMap<u32, u64>>>,
        memory: Arc<Mutex<Vec<u8>>>,
        byte_width: usize,
        b_tx: Sender<BBeat>,
    }
    impl WriteDataChannel for MockW {
        fn post(&self, beat: WriteBeat) -> Result<(), crate::error::ChannelError> {
            let mut cursor = self.cursor.lock().unwrap();
            let addr = *cursor.get(&beat.id).expect("AW must precede its W beats");
            {
                let mut mem = self.memory.lock().unwrap();
                for lane in 0..self.byte_width {
                    if beat.strobe & (1u128 << lane) != 0 {
                        mem[addr as usize + lane] = beat.data[lane];
                    }
                }
            }
            if beat.last {
                cursor.remove(&beat.id);
                self.b_tx.send(BBeat { id: beat.id, response: ResponseCode::Okay, user: 0 }).unwrap();
            } else {
                cursor.insert(beat.id, addr + self.byte_width as u64);
            }
            Ok(())
        }
    }

    struct MockB {
        b_rx: Mutex<Receiver<BBeat>>,
    }
    impl ResponseChannel for MockB {
        type Beat = BBeat;
        fn recv(&self) -> Result<BBeat, crate::error::ChannelError> {
            self.b_rx.lock().unwrap().recv().map_err(|_| crate::error::ChannelError::Rejected("closed".into()))
        }
    }

    struct MockAr(Sender<AddressTransaction>);
    impl AddressChannel for MockAr {
        fn post(&self, txn: AddressTransaction) -> Result<(), crate::error::ChannelError> {
            self.0.send(txn).unwrap();
            Ok(())
        }
    }

    /// Reads `byte_width` bytes per beat from shared `memory`, tracking a
    /// per-burst cursor so a multi-beat read advances correctly and asserts
    /// `last` only on the burst's final beat.
    struct MockR {
        ar_rx: Mutex<Receiver<AddressTransaction>>,
        memory: Arc<Mutex<Vec<u8>>>,
        byte_width: usize,
        pending: Mutex<Option<(u32, u64, u16)>>,
    }
    impl ResponseChannel for MockR {
        type Beat = RBeat;
        fn recv(&self) -> Result<RBeat, crate::error::ChannelError> {
            let mut pending = self.pending.lock().unwrap();
            let (id, addr, beats_remaining) = match pending.take() {
                Some(state) => state,
                None => {
                    let txn = self
                        .ar_rx
                        .lock()
                        .unwrap()
                        .recv()
                        .map_err(|_| crate::error::ChannelError::Rejected("closed".into()))?;
                    (txn.id, txn.address, txn.len + 1)
                }
            };

            let mem = self.memory.lock().unwrap();
            let addr_usize = addr as usize;
            let mut data = vec![0u8; self.byte_width];
            data.copy_from_slice(&mem[addr_usize..addr_usize + self.byte_width]);
            drop(mem);

            let remaining = beats_remaining - 1;
            let last = remaining == 0;
            if !last {
                *pending = Some((id, addr + self.byte_width as u64, remaining));
            }
            Ok(RBeat { id, data, response: ResponseCode::Okay, last, user: 0 })
        }
    }

    fn make_manager() -> BusManager {
        let (b_tx, b_rx) = mpsc::channel();
        let (ar_tx, ar_rx) = mpsc::channel();
        let geometry = BusGeometry::new(4, 4).unwrap();
        let memory = Arc::new(Mutex::new(vec![0u8; 0x2000]));
        let cursor = Arc::new(Mutex::new(HashMap::new()));
        BusManager::new(
            geometry,
            WriteChannels {
                aw: MockAw { cursor: Arc::clone(&cursor) },
                w: MockW { cursor, memory: Arc::clone(&memory), byte_width: 4, b_tx },
                b: MockB { b_rx: Mutex::new(b_rx) },
            },
            ReadChannels {
                ar: MockAr(ar_tx),
                r: MockR { ar_rx: Mutex::new(ar_rx), memory, byte_width: 4, pending: Mutex::new(None) },
            },
        )
    }

    #[test]
    fn idle_is_conjunction_of_both_engines() {
        let manager = make_manager();
        assert!(manager.idle());
    }

    #[test]
    fn write_word_and_read_word_round_trip_shape() {
        let manager = make_manager();
        let response = manager.write_word(0x1000, 0x1234, 4, Attributes::default()).unwrap();
        assert_eq!(response, ResponseCode::Okay);
        manager.wait_write_idle();

        let (_value, response) = manager.read_word(0x1000, 4, Attributes::default()).unwrap();
        assert_eq!(response, ResponseCode::Okay);
    }

    #[test]
    fn byte_dword_qword_convenience_methods_round_trip() {
        let manager = make_manager();
        manager.write_byte(0x100, 0xAB, Attributes::default()).unwrap();
        manager.write_dword(0x200, 0xDEAD_BEEF, Attributes::default()).unwrap();
        manager.write_qword(0x300, 0x0123_4567_89AB_CDEF, Attributes::default()).unwrap();
        manager.wait_write_idle();

        let (byte, _) = manager.read_byte(0x100, Attributes::default()).unwrap();
        assert_eq!(byte, 0xAB);
        let (dword, _) = manager.read_dword(0x200, Attributes::default()).unwrap();
        assert_eq!(dword, 0xDEAD_BEEF);
        let (qword, _) = manager.read_qword(0x300, Attributes::default()).unwrap();
        assert_eq!(qword, 0x0123_4567_89AB_CDEF);
    }
}
