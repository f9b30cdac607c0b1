//! Write engine: plans and issues AW/W bursts, collects B responses.

use std::collections::HashMap;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use log::{debug, error, trace, warn};

use crate::attributes::Attributes;
use crate::channel::{AddressChannel, AddressTransaction, BBeat, BusGeometry, ResponseChannel, WriteChannels, WriteDataChannel};
use crate::error::CallerError;
use crate::id_pool::IdPool;
use crate::model::{Outcome, RequestState, ResponseCode, WriteResult};
use crate::planner::{self, PlannedBursts};
use crate::registry::Registry;
use crate::token::Token;

struct WriteJob {
    token: Token,
    address: u64,
    length: usize,
    attrs: Attributes,
    planned: PlannedBursts,
    beats: Vec<planner::WriteBeat>,
}

struct WriteAccum {
    address: u64,
    length: usize,
    remaining_bursts: usize,
    response: ResponseCode,
    per_beat: Vec<ResponseCode>,
    users: Vec<u32>,
}

/// Drives write bursts across an AW/W/B channel triple.
///
/// Owns two background threads for its lifetime: an issue thread (plans and
/// posts AW/W) and a response thread (collects B beats and completes
/// results). Both are joined on [`Drop`].
pub struct WriteEngine {
    geometry: BusGeometry,
    registry: Arc<Registry<Outcome<WriteResult>>>,
    job_tx: Option<mpsc::Sender<WriteJob>>,
    issue_handle: Option<JoinHandle<()>>,
    response_handle: Option<JoinHandle<()>>,
}

impl WriteEngine {
    /// Spawns a write engine driving `channels`, sized per `geometry`.
    pub fn new<AW, W, B>(geometry: BusGeometry, channels: WriteChannels<AW, W, B>) -> Self
    where
        AW: AddressChannel + Send + 'static,
        W: WriteDataChannel + Send + 'static,
        B: ResponseChannel<Beat = BBeat> + Send + 'static,
    {
        let registry = Arc::new(Registry::new());
        let id_pool = Arc::new(IdPool::new(geometry.id_pool_size()));
        let id_to_token: Arc<Mutex<HashMap<u32, Token>>> = Arc::new(Mutex::new(HashMap::new()));
        let accum: Arc<Mutex<HashMap<Token, WriteAccum>>> = Arc::new(Mutex::new(HashMap::new()));

        let (job_tx, job_rx) = mpsc::channel::<WriteJob>();

        let issue_handle = {
            let registry = Arc::clone(&registry);
            let id_pool = Arc::clone(&id_pool);
            let id_to_token = Arc::clone(&id_to_token);
            let accum = Arc::clone(&accum);
            thread::Builder::new()
                .name("axi-write-issue".into())
                .spawn(move || {
                    run_issue_thread(job_rx, channels.aw, channels.w, &registry, &id_pool, &id_to_token, &accum);
                })
                .expect("failed to spawn write-issue thread")
        };

        let response_handle = {
            let registry = Arc::clone(&registry);
            let id_pool = Arc::clone(&id_pool);
            thread::Builder::new()
                .name("axi-write-response".into())
                .spawn(move || {
                    run_response_thread(channels.b, &registry, &id_pool, &id_to_token, &accum);
                })
                .expect("failed to spawn write-response thread")
        };

        Self {
            geometry,
            registry,
            job_tx: Some(job_tx),
            issue_handle: Some(issue_handle),
            response_handle: Some(response_handle),
        }
    }

    /// Submits a write request, returning its token immediately.
    ///
    /// Validates and plans the request synchronously (so malformed requests
    /// fail before any ID is consumed); issuing the planned bursts and
    /// collecting the response happens on the engine's background threads.
    ///
    /// # Errors
    ///
    /// Returns [`CallerError::EmptyRequest`], [`CallerError::InvalidSize`],
    /// [`CallerError::DuplicateToken`], or [`CallerError::EngineStopped`] if
    /// the engine's issue thread has already terminated.
    pub fn submit(&self, request: crate::model::WriteRequest) -> Result<Token, CallerError> {
        let bus_width = self.geometry.byte_width();
        let size_log2 = request
            .attrs
            .size_log2
            .unwrap_or_else(|| bus_width.trailing_zeros() as u8);

        #[allow(clippy::cast_possible_truncation)]
        let planned = planner::plan(request.address, request.data.len() as u64, size_log2, bus_width)
            .map_err(|err| match err {
                crate::error::PlannerError::InvalidSize => CallerError::InvalidSize { size_log2, bus_width },
                crate::error::PlannerError::EmptyRequest => CallerError::EmptyRequest,
            })?;

        self.registry.begin(request.token)?;

        let beats = planner::shape_write_beats(&request.data, &planned, bus_width);
        let job = WriteJob {
            token: request.token,
            address: request.address,
            length: request.data.len(),
            attrs: request.attrs,
            planned,
            beats,
        };

        self.job_tx
            .as_ref()
            .expect("job_tx only cleared in Drop")
            .send(job)
            .map_err(|_| CallerError::EngineStopped)?;

        Ok(request.token)
    }

    /// Returns whether `token`'s result is ready, without blocking.
    #[must_use]
    pub fn poll_ready(&self, token: Token) -> bool {
        self.registry.poll_ready(token)
    }

    /// Removes and returns `token`'s result if ready, without blocking.
    pub fn take_result(&self, token: Token) -> Option<Result<WriteResult, CallerError>> {
        self.registry.take_result(token).map(Outcome::into_result)
    }

    /// Blocks until `token`'s result is ready, then removes and returns it.
    pub fn await_result(&self, token: Token) -> Result<WriteResult, CallerError> {
        self.registry.await_result(token).into_result()
    }

    /// Whether no write request is currently in flight.
    #[must_use]
    pub fn idle(&self) -> bool {
        self.registry.idle()
    }

    /// Blocks until no write request is in flight.
    pub fn wait_idle(&self) {
        self.registry.wait_idle();
    }

    /// Submits `data` at `address` with `attrs` and blocks for the result,
    /// mirroring the source's `(length, response)` return shape.
    ///
    /// # Errors
    ///
    /// See [`Self::submit`] and [`Self::await_result`].
    pub fn write(&self, address: u64, data: Vec<u8>, attrs: Attributes) -> Result<(usize, ResponseCode), CallerError> {
        let token = Token::new_auto();
        let request = crate::model::WriteRequest { address, data, attrs, token };
        self.submit(request)?;
        let result = self.await_result(token)?;
        Ok((result.length, result.response))
    }
}

impl Drop for WriteEngine {
    fn drop(&mut self) {
        drop(self.job_tx.take());
        if let Some(handle) = self.issue_handle.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.response_handle.take() {
            let _ = handle.join();
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn run_issue_thread<AW: AddressChannel, W: WriteDataChannel>(
    job_rx: mpsc::Receiver<WriteJob>,
    aw: AW,
    w: W,
    registry: &Registry<Outcome<WriteResult>>,
    id_pool: &IdPool,
    id_to_token: &Mutex<HashMap<u32, Token>>,
    accum: &Mutex<HashMap<Token, WriteAccum>>,
) {
    while let Ok(job) = job_rx.recv() {
        registry.set_state(job.token, RequestState::Issuing);

        accum.lock().expect("accum mutex poisoned").insert(
            job.token,
            WriteAccum {
                address: job.address,
                length: job.length,
                remaining_bursts: job.planned.segments.len(),
                response: ResponseCode::Okay,
                per_beat: Vec::with_capacity(job.planned.segments.len()),
                users: Vec::with_capacity(job.planned.segments.len()),
            },
        );

        // The planner acquires every burst's ID before the issue task starts
        // driving AW/W, suspending on the ID pool if it runs dry.
        let size_log2 = job.planned.num_bytes.trailing_zeros() as u8;
        let bursts = planner::assign_ids(&job.planned, size_log2, || {
            let id = id_pool.acquire();
            id_to_token.lock().expect("id_to_token mutex poisoned").insert(id, job.token);
            id
        });

        let mut beat_cursor = 0usize;
        let mut failed = false;
        for (idx, burst) in bursts.iter().enumerate() {
            if failed {
                break;
            }

            let txn = AddressTransaction {
                id: burst.id,
                address: burst.address,
                len: burst.beats - 1,
                size_log2: burst.size_log2,
                burst_type: job.attrs.burst_type,
                lock: job.attrs.lock,
                cache: job.attrs.cache,
                prot: job.attrs.prot,
                qos: job.attrs.qos,
                region: job.attrs.region,
                user: job.attrs.user,
            };

            debug!("write: posting AW id={} address={:#x} beats={}", burst.id, burst.address, burst.beats);
            if let Err(error) = aw.post(txn) {
                warn!("write: AW post rejected for id={}: {error}", burst.id);
                fail_write_issue(registry, accum, id_pool, id_to_token, job.token, &bursts[idx..], error);
                failed = true;
                break;
            }

            for _ in 0..burst.beats {
                let planned_beat = &job.beats[beat_cursor];
                beat_cursor += 1;
                let beat = crate::channel::WriteBeat {
                    id: burst.id,
                    data: planned_beat.data.clone(),
                    strobe: planned_beat.strobe,
                    last: planned_beat.last,
                    user: 0,
                };
                if let Err(error) = w.post(beat) {
                    warn!("write: W post rejected for id={}: {error}", burst.id);
                    fail_write_issue(registry, accum, id_pool, id_to_token, job.token, &bursts[idx..], error);
                    failed = true;
                    break;
                }
            }
        }

        if !failed {
            trace!("write: all bursts issued for token {:?}, awaiting B", job.token);
            registry.set_state(job.token, RequestState::AwaitingResponse);
        }
    }
}

fn fail_request(
    registry: &Registry<Outcome<WriteResult>>,
    accum: &Mutex<HashMap<Token, WriteAccum>>,
    token: Token,
    error: crate::error::ChannelError,
) {
    accum.lock().expect("accum mutex poisoned").remove(&token);
    registry.complete(Outcome::Failed { token, error: error.into() });
}

/// Unwinds a failed issue attempt: every burst in `unposted` already holds an
/// ID from [`planner::assign_ids`]'s up-front acquisition, so all of them —
/// not just the one whose `post` failed — must be released and unmapped
/// before the request is failed out.
///
/// Earlier bursts of the same job that were already posted before the
/// failure are not unwound here; their B beats are still expected to arrive
/// and will find no accum entry once this function removes it. A channel
/// whose `post` can fail mid-job after succeeding for a prior burst is not
/// supported by this engine.
#[allow(clippy::too_many_arguments)]
fn fail_write_issue(
    registry: &Registry<Outcome<WriteResult>>,
    accum: &Mutex<HashMap<Token, WriteAccum>>,
    id_pool: &IdPool,
    id_to_token: &Mutex<HashMap<u32, Token>>,
    token: Token,
    unposted: &[crate::model::BurstDescriptor],
    error: crate::error::ChannelError,
) {
    let mut map = id_to_token.lock().expect("id_to_token mutex poisoned");
    for burst in unposted {
        map.remove(&burst.id);
        let _ = id_pool.release(burst.id);
    }
    drop(map);
    fail_request(registry, accum, token, error);
}

fn run_response_thread<B: ResponseChannel<Beat = BBeat>>(
    b: B,
    registry: &Registry<Outcome<WriteResult>>,
    id_pool: &IdPool,
    id_to_token: &Mutex<HashMap<u32, Token>>,
    accum: &Mutex<HashMap<Token, WriteAccum>>,
) {
    loop {
        let beat = match b.recv() {
            Ok(beat) => beat,
            Err(error) => {
                error!("write: B channel closed, failing every in-flight request: {error}");
                let mut accum_guard = accum.lock().expect("accum mutex poisoned");
                for (token, _) in accum_guard.drain() {
                    registry.complete(Outcome::Failed { token, error: error.clone().into() });
                }
                return;
            }
        };
        trace!("write: B beat id={} response={:?}", beat.id, beat.response);

        let token = {
            let mut map = id_to_token.lock().expect("id_to_token mutex poisoned");
            match map.remove(&beat.id) {
                Some(token) => token,
                None => {
                    let fault = crate::error::EngineFault::UnknownId(beat.id);
                    error!("{fault}");
                    registry.fail_all_in_flight();
                    panic!("{fault}");
                }
            }
        };
        id_pool.release(beat.id).unwrap_or_else(|fault| {
            error!("{fault}");
            registry.fail_all_in_flight();
            panic!("{fault}");
        });

        let mut accum_guard = accum.lock().expect("accum mutex poisoned");
        let done = {
            let entry = accum_guard
                .get_mut(&token)
                .expect("accum entry must exist for a registered token");
            entry.per_beat.push(beat.response);
            entry.users.push(beat.user);
            if beat.response.is_non_okay() {
                entry.response = beat.response;
            }
            entry.remaining_bursts -= 1;
            entry.remaining_bursts == 0
        };

        if done {
            let entry = accum_guard.remove(&token).expect("just checked present");
            drop(accum_guard);
            debug!("write: token {token:?} complete, response={:?}", entry.response);
            registry.complete(Outcome::Done(WriteResult {
                address: entry.address,
                length: entry.length,
                response: entry.response,
                per_beat_responses: entry.per_beat,
                users: entry.users,
                token,
            }));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::Attributes;
    use crate::channel::WriteChannels;
    use std::sync::mpsc::{Receiver, Sender};

    struct MockAw(Sender<AddressTransaction>);
    impl AddressChannel for MockAw {
        fn post(&self, txn: AddressTransaction) -> Result<(), crate::error::ChannelError> {
            self.0.send(txn).unwrap();
            Ok(())
        }
    }

    struct MockW(Sender<crate::channel::WriteBeat>);
    impl WriteDataChannel for MockW {
        fn post(&self, beat: crate::channel::WriteBeat) -> Result<(), crate::error::ChannelError> {
            self.0.send(beat).unwrap();
            Ok(())
        }
    }

    /// Replies OKAY to every AW it sees, on its own thread.
    struct MockB {
        aw_rx: Mutex<Receiver<AddressTransaction>>,
    }
    impl ResponseChannel for MockB {
        type Beat = BBeat;
        fn recv(&self) -> Result<BBeat, crate::error::ChannelError> {
            let txn = self
                .aw_rx
                .lock()
                .unwrap()
                .recv()
                .map_err(|_| crate::error::ChannelError::Rejected("closed".into()))?;
            Ok(BBeat { id: txn.id, response: ResponseCode::Okay, user: 0 })
        }
    }

    fn make_engine() -> (WriteEngine, Receiver<crate::channel::WriteBeat>) {
        let (aw_tx, aw_rx) = mpsc::channel();
        let (w_tx, w_rx) = mpsc::channel();
        let geometry = BusGeometry::new(4, 4).unwrap();
        let channels = WriteChannels {
            aw: MockAw(aw_tx),
            w: MockW(w_tx),
            b: MockB { aw_rx: Mutex::new(aw_rx) },
        };
        (WriteEngine::new(geometry, channels), w_rx)
    }

    #[test]
    fn single_burst_write_completes_okay() {
        let (engine, _w_rx) = make_engine();
        let (length, response) = engine
            .write(0x1000, vec![1, 2, 3, 4], Attributes::default())
            .unwrap();
        assert_eq!(length, 4);
        assert_eq!(response, ResponseCode::Okay);
        engine.wait_idle();
    }

    #[test]
    fn duplicate_token_is_rejected_synchronously() {
        let (engine, _w_rx) = make_engine();
        let token = Token::new(7);
        let request = crate::model::WriteRequest {
            address: 0,
            data: vec![1, 2, 3, 4],
            attrs: Attributes::default(),
            token,
        };
        engine.submit(request.clone()).unwrap();
        assert_eq!(engine.submit(request), Err(CallerError::DuplicateToken(token)));
        engine.await_result(token).unwrap();
    }

    #[test]
    fn empty_write_is_rejected_before_touching_the_id_pool() {
        let (engine, _w_rx) = make_engine();
        let request = crate::model::WriteRequest {
            address: 0,
            data: vec![],
            attrs: Attributes::default(),
            token: Token::new(1),
        };
        assert_eq!(engine.submit(request), Err(CallerError::EmptyRequest));
    }

    #[test]
    fn oversize_beat_request_is_rejected() {
        let (engine, _w_rx) = make_engine();
        let mut attrs = Attributes::default();
        attrs.size_log2 = Some(4);
        let request = crate::model::WriteRequest {
            address: 0,
            data: vec![1, 2, 3, 4],
            attrs,
            token: Token::new(1),
        };
        assert_eq!(
            engine.submit(request),
            Err(CallerError::InvalidSize { size_log2: 4, bus_width: 4 })
        );
    }
}
