use std::sync::Arc;
use std::time::Duration;

use aes::{Aes128, Aes192, Aes256};
use ctr::cipher::{KeyIvInit, StreamCipher};
use zeroize::Zeroizing;

use crate::engine::Shared;
use crate::err::TkeError;
use crate::queue::{counter_add, QueueState, BLOCK_LEN};

/// How long a worker sleeps between polls of the exit flag while waiting on
/// a queue condition. Rust has no reliable cross-platform thread
/// cancellation, so every condition wait is really a bounded poll.
const EXIT_POLL: Duration = Duration::from_millis(50);

type Ctr128Be<C> = ctr::Ctr128BE<C>;

enum CipherStream {
    Aes128(Ctr128Be<Aes128>),
    Aes192(Ctr128Be<Aes192>),
    Aes256(Ctr128Be<Aes256>),
}

impl CipherStream {
    fn apply(&mut self, buf: &mut [u8]) {
        match self {
            CipherStream::Aes128(c) => c.apply_keystream(buf),
            CipherStream::Aes192(c) => c.apply_keystream(buf),
            CipherStream::Aes256(c) => c.apply_keystream(buf),
        }
    }
}

/// Installed key material. Generates keystream for an arbitrary counter on
/// demand; holds no per-stream state of its own.
pub(crate) struct CipherKey {
    bytes: Zeroizing<Vec<u8>>,
}

impl CipherKey {
    pub(crate) fn new(key: &[u8]) -> Result<Self, TkeError> {
        match key.len() {
            16 | 24 | 32 => Ok(Self {
                bytes: Zeroizing::new(key.to_vec()),
            }),
            other => Err(TkeError::UnsupportedKeyLength(other)),
        }
    }

    /// Fills `out` with keystream starting at `counter`, one AES block at a
    /// time, via CTR mode over an all-zero plaintext.
    pub(crate) fn fill(&self, counter: [u8; BLOCK_LEN], out: &mut [u8]) {
        out.fill(0);
        let mut stream = match self.bytes.len() {
            16 => CipherStream::Aes128(
                Ctr128Be::<Aes128>::new_from_slices(&self.bytes, &counter)
                    .expect("key/iv length validated at construction"),
            ),
            24 => CipherStream::Aes192(
                Ctr128Be::<Aes192>::new_from_slices(&self.bytes, &counter)
                    .expect("key/iv length validated at construction"),
            ),
            32 => CipherStream::Aes256(
                Ctr128Be::<Aes256>::new_from_slices(&self.bytes, &counter)
                    .expect("key/iv length validated at construction"),
            ),
            other => unreachable!("unsupported key length {other} slipped past validation"),
        };
        stream.apply(out);
    }
}

fn exit_requested(shared: &Shared) -> bool {
    *shared.exit_flag.read().expect("exit flag lock poisoned")
}

/// Worker thread body. The bootstrap worker additionally fills queue 0
/// before joining the common loop.
pub(crate) fn run(shared: Arc<Shared>, key: Arc<CipherKey>, is_bootstrap: bool) {
    if is_bootstrap {
        bootstrap_fill(&shared, &key);
    }

    let queue_count = shared.queues.len();
    let mut idx = if queue_count > 1 { 1 } else { 0 };

    while !exit_requested(&shared) {
        let queue = &shared.queues[idx];
        let mut guard = queue.mutex.lock().expect("queue lock poisoned");

        while matches!(guard.state, QueueState::Draining | QueueState::Init) {
            if exit_requested(&shared) {
                return;
            }
            let (g, _timeout) = queue
                .cv
                .wait_timeout(guard, EXIT_POLL)
                .expect("queue lock poisoned");
            guard = g;
        }

        if exit_requested(&shared) {
            return;
        }

        if guard.state != QueueState::Empty {
            drop(guard);
            idx = (idx + 1) % queue_count;
            continue;
        }

        guard.state = QueueState::Filling;
        let counter = guard.counter;
        queue.cv.notify_all();
        drop(guard);

        let mut fresh = vec![0u8; shared.kqlen * BLOCK_LEN];
        key.fill(counter, &mut fresh);

        let mut guard = queue.mutex.lock().expect("queue lock poisoned");
        guard.blocks.copy_from_slice(&fresh);
        counter_add(&mut guard.counter, (shared.kqlen * queue_count) as u64);
        guard.state = QueueState::Full;
        queue.cv.notify_all();
        drop(guard);

        idx = (idx + 1) % queue_count;
    }
}

/// Generates queue 0's first cycle of blocks in place, then hands it
/// straight to the consumer by marking it `Draining` (skipping `Full`,
/// since the installer is already blocked waiting for exactly this).
fn bootstrap_fill(shared: &Shared, key: &CipherKey) {
    let queue = &shared.queues[0];
    let mut guard = queue.mutex.lock().expect("queue lock poisoned");
    if guard.state != QueueState::Init {
        return;
    }
    let counter = guard.counter;
    drop(guard);

    let mut fresh = vec![0u8; shared.kqlen * BLOCK_LEN];
    key.fill(counter, &mut fresh);

    let mut guard = queue.mutex.lock().expect("queue lock poisoned");
    guard.blocks.copy_from_slice(&fresh);
    let queue_count = shared.queues.len();
    counter_add(&mut guard.counter, (shared.kqlen * queue_count) as u64);
    guard.state = QueueState::Draining;
    queue.cv.notify_all();
}

#[cfg(test)]
mod test {
    use super::*;
    use hex_literal::hex;

    /// NIST SP 800-38A F.5.1 (CTR-AES128.Encrypt), block 1: the keystream
    /// is the first ciphertext block XORed with the first plaintext block.
    #[test]
    fn fill_matches_nist_aes128_ctr_known_answer() {
        let key = hex!("2b7e151628aed2a6abf7158809cf4f3c");
        let counter = hex!("f0f1f2f3f4f5f6f7f8f9fafbfcfdfeff");
        let expected_keystream = hex!("ec8cdf7398607cb0f2d21675ea9ea1e4");

        let cipher_key = CipherKey::new(&key).expect("key length valid");
        let mut out = [0u8; BLOCK_LEN];
        cipher_key.fill(counter, &mut out);

        assert_eq!(out, expected_keystream);
    }
}
