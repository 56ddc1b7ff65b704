use std::sync::{Arc, Mutex, RwLock};
use std::thread::{self, JoinHandle};

use crate::err::TkeError;
use crate::queue::{counter_add, Queue, QueueState, BLOCK_LEN};
use crate::worker::{self, CipherKey};

/// Blocks per keystream queue.
pub const KQLEN: usize = 8192;
/// Upper bound on the number of keystream queues, regardless of core count.
pub const MAX_NUMKQ: usize = 24;
/// Upper bound on the number of worker threads, regardless of core count.
pub const MAX_THREADS: usize = 6;
/// Lower bound on the number of worker threads, even on single-core hosts.
const MIN_THREADS: usize = 2;

/// State shared between the engine handle, every worker thread, and the
/// consumer. Lives as long as the longest-lived thread that can see it.
pub(crate) struct Shared {
    pub(crate) kqlen: usize,
    pub(crate) queues: Vec<Queue>,
    pub(crate) exit_flag: RwLock<bool>,
}

/// One key installation: the shared queue ring, the worker handles spawned
/// for it, and the consumer's read position within that ring.
struct Installation {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
    consume_queue: usize,
    consume_block: usize,
}

impl Installation {
    /// Returns the next keystream block, rolling over to the next queue
    /// (and handing the exhausted one back to the workers) as needed.
    fn next_block(&mut self) -> [u8; BLOCK_LEN] {
        loop {
            let queue_count = self.shared.queues.len();
            let queue = &self.shared.queues[self.consume_queue];
            let guard = queue.mutex.lock().expect("queue lock poisoned");
            if self.consume_block < self.shared.kqlen {
                let offset = self.consume_block * BLOCK_LEN;
                let mut block = [0u8; BLOCK_LEN];
                block.copy_from_slice(&guard.blocks[offset..offset + BLOCK_LEN]);
                drop(guard);
                self.consume_block += 1;
                return block;
            }
            drop(guard);
            self.rollover(queue_count);
        }
    }

    /// Consumer-side handoff: wait for the next queue to finish filling,
    /// claim it for draining, then release the queue just exhausted back
    /// to the workers as empty. Producers get strict priority refilling a
    /// queue that was just drained.
    fn rollover(&mut self, queue_count: usize) {
        let next_idx = (self.consume_queue + 1) % queue_count;
        {
            let next = &self.shared.queues[next_idx];
            let mut guard = next.mutex.lock().expect("queue lock poisoned");
            while guard.state != QueueState::Full {
                guard = next.cv.wait(guard).expect("queue lock poisoned");
            }
            guard.state = QueueState::Draining;
            next.cv.notify_all();
        }
        {
            let prev = &self.shared.queues[self.consume_queue];
            let mut guard = prev.mutex.lock().expect("queue lock poisoned");
            guard.state = QueueState::Empty;
            prev.cv.notify_all();
        }
        self.consume_queue = next_idx;
        self.consume_block = 0;
    }
}

/// Picks a worker count from host core topology: physical cores / 2 without
/// SMT, physical cores / 4 with SMT (detected as logical core count
/// exceeding physical), clamped to `[MIN_THREADS, MAX_THREADS]`.
fn choose_worker_count() -> usize {
    let physical = num_cpus::get_physical().max(1);
    let logical = num_cpus::get().max(1);
    let divisor = if logical > physical { 4 } else { 2 };
    (physical / divisor).clamp(MIN_THREADS, MAX_THREADS)
}

/// Queue count is `4 * workers`, clamped to `MAX_NUMKQ`.
fn choose_queue_count(worker_count: usize) -> usize {
    (worker_count * 4).min(MAX_NUMKQ)
}

fn stop_installation(mut installation: Installation) {
    *installation.shared.exit_flag.write().expect("exit flag lock poisoned") = true;
    for queue in &installation.shared.queues {
        let guard = queue.mutex.lock().expect("queue lock poisoned");
        queue.cv.notify_all();
        drop(guard);
    }
    for handle in installation.workers.drain(..) {
        let _ = handle.join();
    }
}

/// A multi-threaded AES-CTR keystream engine.
///
/// Construct with [`Engine::new`], install key material with
/// [`Engine::install_key`], then drive encryption or decryption through
/// [`Engine::process`]. Dropping the engine tears down its worker pool.
pub struct Engine {
    state: Mutex<Option<Installation>>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    /// Creates an engine with no key installed. `process` fails until
    /// [`Engine::install_key`] succeeds.
    #[must_use]
    pub fn new() -> Self {
        Engine {
            state: Mutex::new(None),
        }
    }

    /// Installs new key material, tearing down and replacing any prior
    /// installation. Seeds queue 0 with `iv` and every other queue `i`
    /// with `iv + i * KQLEN`, spawns a fresh worker pool sized from host
    /// core topology, and blocks until queue 0 is ready for consumption.
    ///
    /// `enc_flag` carries no effect on keystream generation (CTR mode is
    /// symmetric); it is recorded for diagnostics only.
    pub fn install_key(&self, key: &[u8], iv: [u8; BLOCK_LEN], enc_flag: bool) -> crate::Result<()> {
        let cipher_key = Arc::new(CipherKey::new(key)?);

        let mut state = self.state.lock().expect("engine lock poisoned");
        if let Some(previous) = state.take() {
            stop_installation(previous);
        }

        let worker_count = choose_worker_count();
        let queue_count = choose_queue_count(worker_count);

        let mut queues = Vec::with_capacity(queue_count);
        for i in 0..queue_count {
            let mut counter = iv;
            counter_add(&mut counter, (i * KQLEN) as u64);
            let queue_state = if i == 0 { QueueState::Init } else { QueueState::Empty };
            queues.push(Queue::new(KQLEN, counter, queue_state));
        }

        let shared = Arc::new(Shared {
            kqlen: KQLEN,
            queues,
            exit_flag: RwLock::new(false),
        });

        tracing::debug!(worker_count, queue_count, enc_flag, "installing keystream engine");

        let mut workers = Vec::with_capacity(worker_count);
        for i in 0..worker_count {
            let shared = Arc::clone(&shared);
            let cipher_key = Arc::clone(&cipher_key);
            let is_bootstrap = i == 0;
            let handle = thread::Builder::new()
                .name(format!("hpn-tke-{i}"))
                .spawn(move || worker::run(shared, cipher_key, is_bootstrap))
                .expect("failed to spawn keystream worker thread");
            workers.push(handle);
        }

        {
            let queue0 = &shared.queues[0];
            let mut guard = queue0.mutex.lock().expect("queue lock poisoned");
            while guard.state == QueueState::Init {
                guard = queue0.cv.wait(guard).expect("queue lock poisoned");
            }
        }

        *state = Some(Installation {
            shared,
            workers,
            consume_queue: 0,
            consume_block: 0,
        });
        Ok(())
    }

    /// XORs `src` with the next `src.len()` bytes of keystream into `dst`.
    /// `src` and `dst` must have equal length, a multiple of 16.
    pub fn process(&self, src: &[u8], dst: &mut [u8]) -> crate::Result<()> {
        if src.len() != dst.len() || src.len() % BLOCK_LEN != 0 {
            return Err(TkeError::UnalignedLength(src.len()));
        }

        let mut state = self.state.lock().expect("engine lock poisoned");
        let installation = state.as_mut().ok_or(TkeError::NotInstalled)?;

        for (s_chunk, d_chunk) in src
            .chunks_exact(BLOCK_LEN)
            .zip(dst.chunks_exact_mut(BLOCK_LEN))
        {
            let block = installation.next_block();
            for i in 0..BLOCK_LEN {
                d_chunk[i] = s_chunk[i] ^ block[i];
            }
        }
        Ok(())
    }

    /// Cancels and joins all worker threads, releasing the installed key.
    /// A no-op if no key is currently installed.
    pub fn teardown(&self) {
        let mut state = self.state.lock().expect("engine lock poisoned");
        if let Some(installation) = state.take() {
            stop_installation(installation);
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod test {
    #![allow(clippy::unwrap_used)]
    use super::*;

    fn xor_roundtrip(key: &[u8], iv: [u8; BLOCK_LEN], plaintext: &[u8]) -> Vec<u8> {
        let engine = Engine::new();
        engine.install_key(key, iv, true).expect("install");
        let mut ciphertext = vec![0u8; plaintext.len()];
        engine.process(plaintext, &mut ciphertext).expect("encrypt");

        let engine = Engine::new();
        engine.install_key(key, iv, false).expect("install");
        let mut decrypted = vec![0u8; ciphertext.len()];
        engine.process(&ciphertext, &mut decrypted).expect("decrypt");
        decrypted
    }

    #[test]
    fn round_trip_recovers_plaintext() {
        let key = [0x42u8; 32];
        let iv = [0u8; BLOCK_LEN];
        let mut plaintext = vec![0u8; 1024 * 1024];
        for (i, b) in plaintext.iter_mut().enumerate() {
            *b = (i % 256) as u8;
        }
        let decrypted = xor_roundtrip(&key, iv, &plaintext);
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn process_rejects_unaligned_length() {
        let engine = Engine::new();
        engine.install_key(&[1u8; 16], [0u8; BLOCK_LEN], true).expect("install");
        let src = [0u8; 15];
        let mut dst = [0u8; 15];
        assert!(matches!(
            engine.process(&src, &mut dst),
            Err(TkeError::UnalignedLength(15))
        ));
    }

    #[test]
    fn process_without_install_fails() {
        let engine = Engine::new();
        let src = [0u8; 16];
        let mut dst = [0u8; 16];
        assert!(matches!(engine.process(&src, &mut dst), Err(TkeError::NotInstalled)));
    }

    #[test]
    fn determinism_across_fresh_engines() {
        let key = [7u8; 16];
        let iv = [0u8; BLOCK_LEN];
        let len = 10 * 1024 * 1024;
        let zeroes = vec![0u8; len];

        let a = Engine::new();
        a.install_key(&key, iv, true).expect("install");
        let mut out_a = vec![0u8; len];
        a.process(&zeroes, &mut out_a).expect("process");

        let b = Engine::new();
        b.install_key(&key, iv, true).expect("install");
        let mut out_b = vec![0u8; len];
        b.process(&zeroes, &mut out_b).expect("process");

        assert_eq!(out_a, out_b);
    }

    #[test]
    fn multi_cycle_matches_raw_ctr_keystream() {
        // Long enough to force the consumer through several ring rotations
        // regardless of host core count (the worst-case ring, at
        // `MAX_NUMKQ` queues, is `MAX_NUMKQ * KQLEN` blocks): if each
        // queue's stored counter were under-advanced per refill, queue 0
        // would repeat a prior cycle's keystream the second time around,
        // and this comparison against a single straight-line CTR stream
        // over the same counter range would catch it.
        use crate::worker::CipherKey;

        let key = [9u8; 16];
        let iv = [0u8; BLOCK_LEN];
        let len = (MAX_NUMKQ + 2) * KQLEN * BLOCK_LEN;
        let zeroes = vec![0u8; len];

        let engine = Engine::new();
        engine.install_key(&key, iv, true).expect("install");
        let mut via_engine = vec![0u8; len];
        engine.process(&zeroes, &mut via_engine).expect("process");

        let cipher_key = CipherKey::new(&key).expect("cipher key");
        let mut expected = vec![0u8; len];
        cipher_key.fill(iv, &mut expected);

        assert_eq!(via_engine, expected);
    }

    #[test]
    fn rekey_restarts_counter_from_zero() {
        let engine = Engine::new();
        engine.install_key(&[1u8; 16], [0u8; BLOCK_LEN], true).expect("install");

        let zeroes = vec![0u8; 64];
        let mut first = vec![0u8; 64];
        engine.process(&zeroes, &mut first).expect("process");

        engine.install_key(&[2u8; 16], [0u8; BLOCK_LEN], true).expect("rekey");
        let mut after_rekey = vec![0u8; 64];
        engine.process(&zeroes, &mut after_rekey).expect("process");

        let fresh = Engine::new();
        fresh.install_key(&[2u8; 16], [0u8; BLOCK_LEN], true).expect("install");
        let mut expected = vec![0u8; 64];
        fresh.process(&zeroes, &mut expected).expect("process");

        assert_eq!(after_rekey, expected);
        assert_ne!(after_rekey, first);
    }

    #[test]
    fn teardown_leaves_no_installation() {
        let engine = Engine::new();
        engine.install_key(&[3u8; 16], [0u8; BLOCK_LEN], true).expect("install");
        engine.teardown();
        let src = [0u8; 16];
        let mut dst = [0u8; 16];
        assert!(matches!(engine.process(&src, &mut dst), Err(TkeError::NotInstalled)));
    }

    #[test]
    fn rejects_unsupported_key_length() {
        let engine = Engine::new();
        let err = engine.install_key(&[0u8; 20], [0u8; BLOCK_LEN], true).unwrap_err();
        assert!(matches!(err, TkeError::UnsupportedKeyLength(20)));
    }
}
