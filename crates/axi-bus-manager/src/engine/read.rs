//! Read engine: plans and issues AR bursts, collects and reassembles R beats.

use std::collections::HashMap;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use log::{debug, error, trace, warn};

use crate::attributes::Attributes;
use crate::channel::{AddressChannel, AddressTransaction, BusGeometry, RBeat, ReadChannels, ResponseChannel};
use crate::error::{CallerError, EngineFault};
use crate::id_pool::IdPool;
use crate::model::{Outcome, ReadResult, RequestState, ResponseCode};
use crate::planner::{self, PlannedBursts, ReadLayout};
use crate::registry::Registry;
use crate::token::Token;

struct ReadJob {
    token: Token,
    address: u64,
    length: usize,
    attrs: Attributes,
    planned: PlannedBursts,
    layout: ReadLayout,
}

/// Tracks one in-flight burst's position in the overall read's byte layout:
/// how many beats it still owes, and the global beat index its next beat
/// lands at.
struct BurstProgress {
    next_global_beat: u64,
    beats_remaining: u16,
    beats_total: u16,
}

struct ReadAccum {
    address: u64,
    length: usize,
    remaining_bursts: usize,
    response: ResponseCode,
    per_beat: Vec<ResponseCode>,
    users: Vec<u32>,
    data: Vec<u8>,
    layout: ReadLayout,
    /// Per-ID progress for bursts of this request still outstanding.
    bursts_by_id: HashMap<u32, BurstProgress>,
}

/// Drives read bursts across an AR/R channel pair.
///
/// Owns two background threads for its lifetime: an issue thread (plans and
/// posts AR) and a response thread (collects R beats, reassembles bytes, and
/// completes results). Both are joined on [`Drop`].
pub struct ReadEngine {
    geometry: BusGeometry,
    registry: Arc<Registry<Outcome<ReadResult>>>,
    job_tx: Option<mpsc::Sender<ReadJob>>,
    issue_handle: Option<JoinHandle<()>>,
    response_handle: Option<JoinHandle<()>>,
}

impl ReadEngine {
    /// Spawns a read engine driving `channels`, sized per `geometry`.
    pub fn new<AR, R>(geometry: BusGeometry, channels: ReadChannels<AR, R>) -> Self
    where
        AR: AddressChannel + Send + 'static,
        R: ResponseChannel<Beat = RBeat> + Send + 'static,
    {
        let registry = Arc::new(Registry::new());
        let id_pool = Arc::new(IdPool::new(geometry.id_pool_size()));
        let id_to_token: Arc<Mutex<HashMap<u32, Token>>> = Arc::new(Mutex::new(HashMap::new()));
        let accum: Arc<Mutex<HashMap<Token, ReadAccum>>> = Arc::new(Mutex::new(HashMap::new()));

        let (job_tx, job_rx) = mpsc::channel::<ReadJob>();

        let issue_handle = {
            let registry = Arc::clone(&registry);
            let id_pool = Arc::clone(&id_pool);
            let id_to_token = Arc::clone(&id_to_token);
            let accum = Arc::clone(&accum);
            thread::Builder::new()
                .name("axi-read-issue".into())
                .spawn(move || {
                    run_issue_thread(job_rx, channels.ar, &registry, &id_pool, &id_to_token, &accum);
                })
                .expect("failed to spawn read-issue thread")
        };

        let response_handle = {
            let registry = Arc::clone(&registry);
            let id_pool = Arc::clone(&id_pool);
            thread::Builder::new()
                .name("axi-read-response".into())
                .spawn(move || {
                    run_response_thread(channels.r, &registry, &id_pool, &id_to_token, &accum);
                })
                .expect("failed to spawn read-response thread")
        };

        Self {
            geometry,
            registry,
            job_tx: Some(job_tx),
            issue_handle: Some(issue_handle),
            response_handle: Some(response_handle),
        }
    }

    /// Submits a read request, returning its token immediately.
    ///
    /// Validates and plans the request synchronously; issuing the planned
    /// bursts and reassembling the response happens on the engine's
    /// background threads.
    ///
    /// # Errors
    ///
    /// Returns [`CallerError::EmptyRequest`], [`CallerError::InvalidSize`],
    /// [`CallerError::DuplicateToken`], or [`CallerError::EngineStopped`] if
    /// the engine's issue thread has already terminated.
    pub fn submit(&self, request: crate::model::ReadRequest) -> Result<Token, CallerError> {
        let bus_width = self.geometry.byte_width();
        let size_log2 = request
            .attrs
            .size_log2
            .unwrap_or_else(|| bus_width.trailing_zeros() as u8);

        let planned = planner::plan(request.address, request.length as u64, size_log2, bus_width)
            .map_err(|err| match err {
                crate::error::PlannerError::InvalidSize => CallerError::InvalidSize { size_log2, bus_width },
                crate::error::PlannerError::EmptyRequest => CallerError::EmptyRequest,
            })?;

        self.registry.begin(request.token)?;

        let layout = planner::read_layout(&planned, bus_width);
        let job = ReadJob {
            token: request.token,
            address: request.address,
            length: request.length,
            attrs: request.attrs,
            planned,
            layout,
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
    pub fn take_result(&self, token: Token) -> Option<Result<ReadResult, CallerError>> {
        self.registry.take_result(token).map(Outcome::into_result)
    }

    /// Blocks until `token`'s result is ready, then removes and returns it.
    pub fn await_result(&self, token: Token) -> Result<ReadResult, CallerError> {
        self.registry.await_result(token).into_result()
    }

    /// Whether no read request is currently in flight.
    #[must_use]
    pub fn idle(&self) -> bool {
        self.registry.idle()
    }

    /// Blocks until no read request is in flight.
    pub fn wait_idle(&self) {
        self.registry.wait_idle();
    }

    /// Submits a read of `length` bytes at `address` with `attrs` and blocks
    /// for the result, mirroring the source's `(data, response)` return shape.
    ///
    /// # Errors
    ///
    /// See [`Self::submit`] and [`Self::await_result`].
    pub fn read(&self, address: u64, length: usize, attrs: Attributes) -> Result<(Vec<u8>, ResponseCode), CallerError> {
        let token = Token::new_auto();
        let request = crate::model::ReadRequest { address, length, attrs, token };
        self.submit(request)?;
        let result = self.await_result(token)?;
        Ok((result.data, result.response))
    }
}

impl Drop for ReadEngine {
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

fn run_issue_thread<AR: AddressChannel>(
    job_rx: mpsc::Receiver<ReadJob>,
    ar: AR,
    registry: &Registry<Outcome<ReadResult>>,
    id_pool: &IdPool,
    id_to_token: &Mutex<HashMap<u32, Token>>,
    accum: &Mutex<HashMap<Token, ReadAccum>>,
) {
    while let Ok(job) = job_rx.recv() {
        registry.set_state(job.token, RequestState::Issuing);

        // Every burst's ID is acquired up front, before AR is driven for any
        // of them.
        let size_log2 = job.planned.num_bytes.trailing_zeros() as u8;
        let bursts = planner::assign_ids(&job.planned, size_log2, || {
            let id = id_pool.acquire();
            id_to_token.lock().expect("id_to_token mutex poisoned").insert(id, job.token);
            id
        });

        let mut bursts_by_id = HashMap::with_capacity(bursts.len());
        for (idx, burst) in bursts.iter().enumerate() {
            bursts_by_id.insert(
                burst.id,
                BurstProgress {
                    next_global_beat: job.layout.segment_beat_offsets[idx],
                    beats_remaining: burst.beats,
                    beats_total: burst.beats,
                },
            );
        }

        // Registered before any AR is posted: the response thread runs
        // free on `r.recv()` and can see the first burst's R beats before
        // this thread posts the second burst's AR, so the accum entry must
        // already exist by then.
        accum.lock().expect("accum mutex poisoned").insert(
            job.token,
            ReadAccum {
                address: job.address,
                length: job.length,
                remaining_bursts: job.planned.segments.len(),
                response: ResponseCode::Okay,
                per_beat: Vec::with_capacity(job.planned.segments.len()),
                users: Vec::with_capacity(job.planned.segments.len()),
                data: vec![0u8; job.layout.total_output_bytes],
                layout: job.layout,
                bursts_by_id,
            },
        );

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

            debug!("read: posting AR id={} address={:#x} beats={}", burst.id, burst.address, burst.beats);
            if let Err(error) = ar.post(txn) {
                warn!("read: AR post rejected for id={}: {error}", burst.id);
                fail_read_issue(registry, accum, id_pool, id_to_token, job.token, &bursts[idx..], error);
                failed = true;
                break;
            }
        }

        if !failed {
            trace!("read: all bursts issued for token {:?}, awaiting R", job.token);
            registry.set_state(job.token, RequestState::AwaitingResponse);
        }
    }
}

fn fail_request(
    registry: &Registry<Outcome<ReadResult>>,
    accum: &Mutex<HashMap<Token, ReadAccum>>,
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
/// failure are not unwound here; their R beats are still expected to arrive
/// and will find no accum entry once this function removes it. A channel
/// whose `post` can fail mid-job after succeeding for a prior burst is not
/// supported by this engine.
fn fail_read_issue(
    registry: &Registry<Outcome<ReadResult>>,
    accum: &Mutex<HashMap<Token, ReadAccum>>,
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

fn run_response_thread<R: ResponseChannel<Beat = RBeat>>(
    r: R,
    registry: &Registry<Outcome<ReadResult>>,
    id_pool: &IdPool,
    id_to_token: &Mutex<HashMap<u32, Token>>,
    accum: &Mutex<HashMap<Token, ReadAccum>>,
) {
    loop {
        let beat = match r.recv() {
            Ok(beat) => beat,
            Err(error) => {
                error!("read: R channel closed, failing every in-flight request: {error}");
                let mut accum_guard = accum.lock().expect("accum mutex poisoned");
                for (token, _) in accum_guard.drain() {
                    registry.complete(Outcome::Failed { token, error: error.clone().into() });
                }
                return;
            }
        };
        trace!("read: R beat id={} last={} response={:?}", beat.id, beat.last, beat.response);

        let token = {
            let map = id_to_token.lock().expect("id_to_token mutex poisoned");
            match map.get(&beat.id) {
                Some(token) => *token,
                None => {
                    let fault = EngineFault::UnknownId(beat.id);
                    error!("{fault}");
                    registry.fail_all_in_flight();
                    panic!("{fault}");
                }
            }
        };

        let mut accum_guard = accum.lock().expect("accum mutex poisoned");
        let entry = accum_guard
            .get_mut(&token)
            .expect("accum entry must exist for a registered token");

        let burst_done = {
            let progress = entry
                .bursts_by_id
                .get_mut(&beat.id)
                .expect("burst progress must exist for a registered id");

            let beat_in_burst = progress.beats_total - progress.beats_remaining;
            let expected_last = beat_in_burst + 1 == progress.beats_total;
            if beat.last != expected_last {
                let fault = EngineFault::RLastMismatch {
                    id: beat.id,
                    beat: beat_in_burst,
                    beats: progress.beats_total,
                    expected_last,
                };
                error!("{fault}");
                registry.fail_all_in_flight();
                panic!("{fault}");
            }

            let global_beat = progress.next_global_beat;
            #[allow(clippy::cast_possible_truncation)]
            let (start, stop) = entry.layout.beat_ranges[global_beat as usize];
            let out_offset = entry.layout.beat_out_offsets[global_beat as usize];
            for (lane, out_byte) in (start..stop).zip(out_offset..) {
                entry.data[out_byte] = beat.data[lane as usize];
            }

            progress.next_global_beat += 1;
            progress.beats_remaining -= 1;
            progress.beats_remaining == 0
        };

        entry.per_beat.push(beat.response);
        entry.users.push(beat.user);
        if beat.response.is_non_okay() {
            entry.response = beat.response;
        }

        if burst_done {
            entry.bursts_by_id.remove(&beat.id);
            id_to_token.lock().expect("id_to_token mutex poisoned").remove(&beat.id);
            id_pool.release(beat.id).unwrap_or_else(|fault| {
                error!("{fault}");
                registry.fail_all_in_flight();
                panic!("{fault}");
            });
            entry.remaining_bursts -= 1;
        }

        if entry.remaining_bursts == 0 {
            let mut entry = accum_guard.remove(&token).expect("just checked present");
            drop(accum_guard);
            entry.data.truncate(entry.length);
            debug!("read: token {token:?} complete, response={:?}", entry.response);
            registry.complete(Outcome::Done(ReadResult {
                address: entry.address,
                data: entry.data,
                response: entry.response,
                per_beat_responses: entry.per_beat,
                users: entry.users,
                token,
            }));
        }
    }
}
