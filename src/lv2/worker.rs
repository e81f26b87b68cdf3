//! LV2 Worker extension.
//!
//! Plugins call `schedule_work` from `run()`; the request goes into a
//! fixed-size ring and a pooled [`WorkThread`] later calls the plugin's
//! `work()`. Responses come back through a second ring and are delivered
//! with `work_response()` at the start of the next cycle, followed by
//! `end_run()` once the cycle's `run()` has returned.
//!
//! Both rings are allocated before instantiation and never grow. A full
//! ring drops the message and bumps a counter.
//!
//! Two-phase construction:
//!   1. `WorkerSetup::new()` - rings + schedule feature (pre-instantiation)
//!   2. `WorkerSetup::activate(handle, iface)` -> `Worker` (post-instantiation)

use std::ffi::{CStr, c_void};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::thread::{JoinHandle, Thread};
use std::time::Duration;

use parking_lot::Mutex;
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

// ── C-compatible struct definitions matching lv2/worker/worker.h ──

pub const LV2_WORKER_SCHEDULE_URI: &CStr = c"http://lv2plug.in/ns/ext/worker#schedule";
pub const LV2_WORKER_INTERFACE_URI: &str = "http://lv2plug.in/ns/ext/worker#interface";

#[allow(non_camel_case_types)]
pub type LV2_Worker_Status = u32;
pub const LV2_WORKER_SUCCESS: LV2_Worker_Status = 0;
pub const LV2_WORKER_ERR_UNKNOWN: LV2_Worker_Status = 1;
pub const LV2_WORKER_ERR_NO_SPACE: LV2_Worker_Status = 2;

#[allow(non_camel_case_types)]
pub type LV2_Worker_Respond_Handle = *mut c_void;
#[allow(non_camel_case_types)]
pub type LV2_Worker_Respond_Function = unsafe extern "C" fn(
    handle: LV2_Worker_Respond_Handle,
    size: u32,
    data: *const c_void,
) -> LV2_Worker_Status;

#[allow(non_camel_case_types)]
pub type LV2_Worker_Schedule_Handle = *mut c_void;

/// The host-provided feature struct passed to the plugin.
#[repr(C)]
#[allow(non_camel_case_types)]
pub struct LV2_Worker_Schedule {
    pub handle: LV2_Worker_Schedule_Handle,
    pub schedule_work: unsafe extern "C" fn(
        handle: LV2_Worker_Schedule_Handle,
        size: u32,
        data: *const c_void,
    ) -> LV2_Worker_Status,
}

/// Plugin-provided interface retrieved via extension_data.
#[repr(C)]
#[allow(non_camel_case_types)]
pub struct LV2_Worker_Interface {
    pub work: unsafe extern "C" fn(
        instance: *mut c_void, // LV2_Handle
        respond: LV2_Worker_Respond_Function,
        handle: LV2_Worker_Respond_Handle,
        size: u32,
        data: *const c_void,
    ) -> LV2_Worker_Status,
    pub work_response: unsafe extern "C" fn(
        instance: *mut c_void, // LV2_Handle
        size: u32,
        body: *const c_void,
    ) -> LV2_Worker_Status,
    pub end_run: Option<unsafe extern "C" fn(instance: *mut c_void) -> LV2_Worker_Status>,
}

// ── Messages ──

/// Largest request or response body a plugin can pass.
pub const WORK_MESSAGE_SIZE: usize = 2048;

#[derive(Clone, Copy)]
struct WorkMessage {
    size: u32,
    data: [u8; WORK_MESSAGE_SIZE],
}

impl WorkMessage {
    /// # Safety
    /// `data` must be readable for `size` bytes when non-null.
    unsafe fn from_raw(size: u32, data: *const c_void) -> Option<Self> {
        if size as usize > WORK_MESSAGE_SIZE || (size > 0 && data.is_null()) {
            return None;
        }
        let mut msg = WorkMessage {
            size,
            data: [0; WORK_MESSAGE_SIZE],
        };
        if size > 0 {
            let src = unsafe { std::slice::from_raw_parts(data as *const u8, size as usize) };
            msg.data[..size as usize].copy_from_slice(src);
        }
        Some(msg)
    }

    fn as_ptr(&self) -> *const c_void {
        self.data.as_ptr() as *const c_void
    }
}

// ── Thread pool ──

/// One background thread servicing the workers registered with it.
///
/// Cloning gives another handle to the same thread.
#[derive(Clone)]
pub struct WorkThread {
    inner: Arc<WorkThreadInner>,
}

struct WorkThreadInner {
    workers: Mutex<Vec<Weak<WorkerShared>>>,
    running: AtomicBool,
    thread: OnceLock<Thread>,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl WorkThread {
    pub fn spawn(name: &str) -> std::io::Result<Self> {
        let inner = Arc::new(WorkThreadInner {
            workers: Mutex::new(Vec::new()),
            running: AtomicBool::new(true),
            thread: OnceLock::new(),
            join: Mutex::new(None),
        });
        let thread_inner = inner.clone();
        let join = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || work_thread_main(thread_inner))?;
        let _ = inner.thread.set(join.thread().clone());
        *inner.join.lock() = Some(join);
        log::debug!("Started LV2 work thread '{}'", name);
        Ok(Self { inner })
    }

    fn register(&self, worker: &Arc<WorkerShared>) {
        let mut workers = self.inner.workers.lock();
        workers.retain(|w| w.strong_count() > 0);
        workers.push(Arc::downgrade(worker));
    }

    fn wake(&self) {
        if let Some(thread) = self.inner.thread.get() {
            thread.unpark();
        }
    }

    /// Stop the thread and wait for it. Pending requests are abandoned.
    pub fn stop(&self) {
        self.inner.running.store(false, Ordering::Release);
        self.wake();
        let join = self.inner.join.lock().take();
        if let Some(join) = join
            && join.join().is_err()
        {
            log::warn!("LV2 work thread panicked");
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }
}

fn work_thread_main(inner: Arc<WorkThreadInner>) {
    while inner.running.load(Ordering::Acquire) {
        let workers: Vec<Arc<WorkerShared>> = inner
            .workers
            .lock()
            .iter()
            .filter_map(Weak::upgrade)
            .collect();
        for worker in &workers {
            worker.process_requests();
        }
        drop(workers);
        std::thread::park_timeout(Duration::from_millis(50));
    }
}

/// The set of work threads owned by a world. Instances are assigned a
/// thread round-robin.
pub struct WorkerPool {
    threads: Vec<WorkThread>,
    next: AtomicUsize,
}

impl WorkerPool {
    pub fn new(size: usize) -> std::io::Result<Self> {
        let threads = (0..size.max(1))
            .map(|i| WorkThread::spawn(&format!("lv2-worker-{}", i)))
            .collect::<std::io::Result<Vec<_>>>()?;
        Ok(Self {
            threads,
            next: AtomicUsize::new(0),
        })
    }

    pub fn next_thread(&self) -> WorkThread {
        let i = self.next.fetch_add(1, Ordering::Relaxed) % self.threads.len();
        self.threads[i].clone()
    }

    pub fn len(&self) -> usize {
        self.threads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        for thread in &self.threads {
            thread.stop();
        }
    }
}

// ── Per-instance state shared with the work thread ──

#[derive(Clone, Copy)]
struct Binding {
    handle: usize,
    iface: *const LV2_Worker_Interface,
}

// SAFETY: the plugin handle and interface are only dereferenced while the
// worker is alive, under `busy`, and `Worker::shutdown` takes `busy`
// before the plugin can be freed.
unsafe impl Send for Binding {}
unsafe impl Sync for Binding {}

struct WorkerShared {
    alive: AtomicBool,
    /// Held by the work thread for the duration of each `work()` call.
    busy: Mutex<()>,
    binding: OnceLock<Binding>,
    requests: Mutex<HeapCons<WorkMessage>>,
    responses: Mutex<HeapProd<WorkMessage>>,
    dropped_requests: AtomicU64,
    dropped_responses: AtomicU64,
}

impl WorkerShared {
    fn process_requests(&self) {
        let _busy = self.busy.lock();
        if !self.alive.load(Ordering::Acquire) {
            return;
        }
        let Some(binding) = self.binding.get().copied() else {
            return;
        };
        loop {
            let Some(request) = self.requests.lock().try_pop() else {
                break;
            };
            unsafe {
                let iface = &*binding.iface;
                (iface.work)(
                    binding.handle as *mut c_void,
                    respond_callback,
                    self as *const WorkerShared as LV2_Worker_Respond_Handle,
                    request.size,
                    request.as_ptr(),
                );
            }
        }
    }
}

/// Context passed as the `handle` in the `LV2_Worker_Schedule` C struct.
struct ScheduleContext {
    requests: Mutex<HeapProd<WorkMessage>>,
    thread: WorkThread,
    shared: Arc<WorkerShared>,
}

// ── Phase 1: Pre-instantiation setup ──

/// Holds the rings and schedule feature needed BEFORE plugin instantiation.
/// Call `make_feature()` to get the `LV2Feature` to pass to the plugin,
/// then `activate()` once the plugin handle and interface are known.
pub struct WorkerSetup {
    schedule: Box<LV2_Worker_Schedule>,
    context: Box<ScheduleContext>,
    responses: HeapCons<WorkMessage>,
}

// SAFETY: `schedule.handle` points into `context`, which moves with it.
unsafe impl Send for WorkerSetup {}

impl WorkerSetup {
    pub fn new(thread: &WorkThread, queue_size: usize) -> Self {
        let (request_tx, request_rx) = HeapRb::<WorkMessage>::new(queue_size.max(1)).split();
        let (response_tx, response_rx) = HeapRb::<WorkMessage>::new(queue_size.max(1)).split();

        let shared = Arc::new(WorkerShared {
            alive: AtomicBool::new(true),
            busy: Mutex::new(()),
            binding: OnceLock::new(),
            requests: Mutex::new(request_rx),
            responses: Mutex::new(response_tx),
            dropped_requests: AtomicU64::new(0),
            dropped_responses: AtomicU64::new(0),
        });
        let context = Box::new(ScheduleContext {
            requests: Mutex::new(request_tx),
            thread: thread.clone(),
            shared,
        });
        let schedule = Box::new(LV2_Worker_Schedule {
            handle: &*context as *const ScheduleContext as LV2_Worker_Schedule_Handle,
            schedule_work: schedule_work_callback,
        });

        Self {
            schedule,
            context,
            responses: response_rx,
        }
    }

    /// Build the `worker:schedule` feature for `instantiate`.
    pub fn make_feature(&self) -> lv2_raw::core::LV2Feature {
        lv2_raw::core::LV2Feature {
            uri: LV2_WORKER_SCHEDULE_URI.as_ptr(),
            data: &*self.schedule as *const LV2_Worker_Schedule as *mut c_void,
        }
    }

    pub fn dropped_requests(&self) -> u64 {
        self.context.shared.dropped_requests.load(Ordering::Relaxed)
    }

    /// Bind the instantiated plugin and register with the work thread.
    ///
    /// # Safety
    /// `lv2_handle` and `worker_iface` must stay valid until the returned
    /// `Worker` has been shut down or dropped.
    pub unsafe fn activate(
        self,
        lv2_handle: *mut c_void,
        worker_iface: *const LV2_Worker_Interface,
    ) -> Worker {
        let shared = self.context.shared.clone();
        let _ = shared.binding.set(Binding {
            handle: lv2_handle as usize,
            iface: worker_iface,
        });
        self.context.thread.register(&shared);
        // requests scheduled during instantiation are waiting
        self.context.thread.wake();

        Worker {
            _schedule: self.schedule,
            context: self.context,
            responses: self.responses,
            shared,
            lv2_handle,
            worker_iface,
        }
    }
}

// ── Phase 2: Active worker ──

/// Per-instance worker, driven from the audio thread.
pub struct Worker {
    _schedule: Box<LV2_Worker_Schedule>,
    context: Box<ScheduleContext>,
    responses: HeapCons<WorkMessage>,
    shared: Arc<WorkerShared>,
    lv2_handle: *mut c_void,
    worker_iface: *const LV2_Worker_Interface,
}

// SAFETY: the raw plugin pointers are only used from the thread that owns
// the instance (the audio thread) or, under `busy`, by the work thread.
unsafe impl Send for Worker {}

impl Worker {
    /// Deliver pending responses. Call before `run()`.
    pub fn deliver_responses(&mut self) {
        if !self.is_alive() {
            return;
        }
        let iface = unsafe { &*self.worker_iface };
        while let Some(response) = self.responses.try_pop() {
            unsafe {
                (iface.work_response)(self.lv2_handle, response.size, response.as_ptr());
            }
        }
    }

    /// Signal the end of a cycle. Call after `run()`.
    pub fn end_run(&self) {
        if !self.is_alive() {
            return;
        }
        let iface = unsafe { &*self.worker_iface };
        if let Some(end_run) = iface.end_run {
            unsafe {
                end_run(self.lv2_handle);
            }
        }
    }

    /// Stop servicing requests. Waits for a `work()` call in progress, after
    /// which the plugin is never called through this worker again.
    pub fn shutdown(&mut self) {
        if !self.shared.alive.swap(false, Ordering::AcqRel) {
            return;
        }
        drop(self.shared.busy.lock());
        while self.responses.try_pop().is_some() {}
    }

    pub fn is_alive(&self) -> bool {
        self.shared.alive.load(Ordering::Acquire)
    }

    pub fn dropped_requests(&self) -> u64 {
        self.shared.dropped_requests.load(Ordering::Relaxed)
    }

    pub fn dropped_responses(&self) -> u64 {
        self.shared.dropped_responses.load(Ordering::Relaxed)
    }

    /// Wake the work thread, e.g. after requests were queued while it slept.
    pub fn wake(&self) {
        self.context.thread.wake();
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ── Callbacks ──

/// Called by the plugin from `run()` (RT thread) to schedule work.
unsafe extern "C" fn schedule_work_callback(
    handle: LV2_Worker_Schedule_Handle,
    size: u32,
    data: *const c_void,
) -> LV2_Worker_Status {
    if handle.is_null() {
        return LV2_WORKER_ERR_UNKNOWN;
    }
    let ctx = unsafe { &*(handle as *const ScheduleContext) };
    if !ctx.shared.alive.load(Ordering::Acquire) {
        return LV2_WORKER_ERR_UNKNOWN;
    }
    let Some(msg) = (unsafe { WorkMessage::from_raw(size, data) }) else {
        ctx.shared.dropped_requests.fetch_add(1, Ordering::Relaxed);
        return LV2_WORKER_ERR_NO_SPACE;
    };
    // Only the audio thread schedules; try_lock never waits.
    let pushed = ctx
        .requests
        .try_lock()
        .is_some_and(|mut tx| tx.try_push(msg).is_ok());
    if !pushed {
        ctx.shared.dropped_requests.fetch_add(1, Ordering::Relaxed);
        return LV2_WORKER_ERR_NO_SPACE;
    }
    ctx.thread.wake();
    LV2_WORKER_SUCCESS
}

/// Called by the plugin's `work()` to send a response back to the RT thread.
unsafe extern "C" fn respond_callback(
    handle: LV2_Worker_Respond_Handle,
    size: u32,
    data: *const c_void,
) -> LV2_Worker_Status {
    if handle.is_null() {
        return LV2_WORKER_ERR_UNKNOWN;
    }
    let shared = unsafe { &*(handle as *const WorkerShared) };
    let Some(msg) = (unsafe { WorkMessage::from_raw(size, data) }) else {
        shared.dropped_responses.fetch_add(1, Ordering::Relaxed);
        return LV2_WORKER_ERR_NO_SPACE;
    };
    if shared.responses.lock().try_push(msg).is_err() {
        shared.dropped_responses.fetch_add(1, Ordering::Relaxed);
        return LV2_WORKER_ERR_NO_SPACE;
    }
    LV2_WORKER_SUCCESS
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU32;
    use std::time::Instant;

    use super::*;

    /// Stand-in plugin: `work` echoes the request, `work_response` records it.
    #[derive(Default)]
    struct EchoPlugin {
        worked: AtomicU32,
        responses: AtomicU32,
        last_response: AtomicU32,
        end_runs: AtomicU32,
    }

    unsafe extern "C" fn echo_work(
        instance: *mut c_void,
        respond: LV2_Worker_Respond_Function,
        handle: LV2_Worker_Respond_Handle,
        size: u32,
        data: *const c_void,
    ) -> LV2_Worker_Status {
        let plugin = unsafe { &*(instance as *const EchoPlugin) };
        plugin.worked.fetch_add(1, Ordering::SeqCst);
        unsafe { respond(handle, size, data) }
    }

    unsafe extern "C" fn echo_response(
        instance: *mut c_void,
        size: u32,
        body: *const c_void,
    ) -> LV2_Worker_Status {
        let plugin = unsafe { &*(instance as *const EchoPlugin) };
        if size == 4 {
            let bytes = unsafe { std::slice::from_raw_parts(body as *const u8, 4) };
            let value = u32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
            plugin.last_response.store(value, Ordering::SeqCst);
        }
        plugin.responses.fetch_add(1, Ordering::SeqCst);
        LV2_WORKER_SUCCESS
    }

    unsafe extern "C" fn echo_end_run(instance: *mut c_void) -> LV2_Worker_Status {
        let plugin = unsafe { &*(instance as *const EchoPlugin) };
        plugin.end_runs.fetch_add(1, Ordering::SeqCst);
        LV2_WORKER_SUCCESS
    }

    static ECHO_IFACE: LV2_Worker_Interface = LV2_Worker_Interface {
        work: echo_work,
        work_response: echo_response,
        end_run: Some(echo_end_run),
    };

    fn schedule(feature: &lv2_raw::core::LV2Feature, value: u32) -> LV2_Worker_Status {
        let schedule = unsafe { &*(feature.data as *const LV2_Worker_Schedule) };
        let bytes = value.to_ne_bytes();
        unsafe { (schedule.schedule_work)(schedule.handle, 4, bytes.as_ptr() as *const c_void) }
    }

    #[test]
    fn test_request_response_round_trip() {
        let thread = WorkThread::spawn("test-worker").unwrap();
        let plugin = EchoPlugin::default();
        let setup = WorkerSetup::new(&thread, 8);
        let feature = setup.make_feature();
        let mut worker = unsafe {
            setup.activate(&plugin as *const EchoPlugin as *mut c_void, &ECHO_IFACE)
        };

        assert_eq!(schedule(&feature, 42), LV2_WORKER_SUCCESS);

        let deadline = Instant::now() + Duration::from_secs(5);
        while plugin.responses.load(Ordering::SeqCst) == 0 && Instant::now() < deadline {
            worker.deliver_responses();
            std::thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(plugin.worked.load(Ordering::SeqCst), 1);
        assert_eq!(plugin.responses.load(Ordering::SeqCst), 1);
        assert_eq!(plugin.last_response.load(Ordering::SeqCst), 42);

        worker.end_run();
        assert_eq!(plugin.end_runs.load(Ordering::SeqCst), 1);

        worker.shutdown();
        thread.stop();
    }

    #[test]
    fn test_full_request_ring_drops_and_counts() {
        let thread = WorkThread::spawn("test-worker-full").unwrap();
        // not activated, so nothing drains the ring
        let setup = WorkerSetup::new(&thread, 1);
        let feature = setup.make_feature();

        assert_eq!(schedule(&feature, 1), LV2_WORKER_SUCCESS);
        assert_eq!(schedule(&feature, 2), LV2_WORKER_ERR_NO_SPACE);
        assert_eq!(setup.dropped_requests(), 1);
        thread.stop();
    }

    #[test]
    fn test_oversized_request_rejected() {
        let thread = WorkThread::spawn("test-worker-big").unwrap();
        let setup = WorkerSetup::new(&thread, 4);
        let feature = setup.make_feature();
        let schedule = unsafe { &*(feature.data as *const LV2_Worker_Schedule) };
        let big = vec![0u8; WORK_MESSAGE_SIZE + 1];
        let status = unsafe {
            (schedule.schedule_work)(
                schedule.handle,
                big.len() as u32,
                big.as_ptr() as *const c_void,
            )
        };
        assert_eq!(status, LV2_WORKER_ERR_NO_SPACE);
        assert_eq!(setup.dropped_requests(), 1);
        thread.stop();
    }

    #[test]
    fn test_shutdown_stops_delivery() {
        let thread = WorkThread::spawn("test-worker-shutdown").unwrap();
        let plugin = EchoPlugin::default();
        let setup = WorkerSetup::new(&thread, 8);
        let feature = setup.make_feature();
        let mut worker = unsafe {
            setup.activate(&plugin as *const EchoPlugin as *mut c_void, &ECHO_IFACE)
        };

        worker.shutdown();
        assert!(!worker.is_alive());
        assert_eq!(schedule(&feature, 7), LV2_WORKER_ERR_UNKNOWN);

        std::thread::sleep(Duration::from_millis(20));
        worker.deliver_responses();
        worker.end_run();
        assert_eq!(plugin.worked.load(Ordering::SeqCst), 0);
        assert_eq!(plugin.responses.load(Ordering::SeqCst), 0);
        assert_eq!(plugin.end_runs.load(Ordering::SeqCst), 0);
        thread.stop();
    }

    #[test]
    fn test_pool_round_robin() {
        let pool = WorkerPool::new(2).unwrap();
        assert_eq!(pool.len(), 2);
        let a = pool.next_thread();
        let b = pool.next_thread();
        let c = pool.next_thread();
        assert!(!Arc::ptr_eq(&a.inner, &b.inner));
        assert!(Arc::ptr_eq(&a.inner, &c.inner));
        drop(pool);
        assert!(!a.is_running());
    }
}
