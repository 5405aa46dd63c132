//! Background shader compilation
//!
//! [`CompileWorker`] owns one thread that drains a channel of translation
//! requests into a shared [`ShaderCache`]. Draw-call threads call
//! [`CompileWorker::request`], which never blocks on translation: it returns
//! the cached shader when there is one and queues the program otherwise.

use crate::cache::ShaderCache;
use crate::gxp::GxpProgram;
use crate::types::{CompiledShader, Hints};
use crossbeam::channel::{self, Receiver, Sender};
use ov_core::{cache_debug, shader_error};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

struct CompileRequest {
    program: Arc<GxpProgram>,
    hints: Hints,
    key: [u8; 32],
}

/// Translates programs on a dedicated thread
pub struct CompileWorker {
    cache: Arc<ShaderCache>,
    sender: Option<Sender<CompileRequest>>,
    handle: Option<JoinHandle<()>>,
    /// Keys queued or being translated
    in_flight: Arc<Mutex<HashSet<[u8; 32]>>>,
}

impl CompileWorker {
    pub fn spawn(cache: Arc<ShaderCache>) -> std::io::Result<Self> {
        let (sender, receiver) = channel::unbounded();
        let in_flight = Arc::new(Mutex::new(HashSet::new()));

        let handle = thread::Builder::new().name("shader-compile".into()).spawn({
            let cache = Arc::clone(&cache);
            let in_flight = Arc::clone(&in_flight);
            move || run(&cache, &receiver, &in_flight)
        })?;

        Ok(Self {
            cache,
            sender: Some(sender),
            handle: Some(handle),
            in_flight,
        })
    }

    /// The cached translation, or `None` after queueing one
    pub fn request(&self, program: &Arc<GxpProgram>, hints: Hints) -> Option<Arc<CompiledShader>> {
        if let Some(shader) = self.cache.lookup(program, &hints) {
            return Some(shader);
        }
        self.submit(program, hints);
        None
    }

    /// Queue a translation unless the same one is already pending
    ///
    /// Returns false when nothing was queued.
    pub fn submit(&self, program: &Arc<GxpProgram>, hints: Hints) -> bool {
        let Some(sender) = &self.sender else {
            return false;
        };
        let key = self.cache.key(program, &hints);
        if !self.in_flight.lock().insert(key) {
            return false;
        }

        let request = CompileRequest {
            program: Arc::clone(program),
            hints,
            key,
        };
        if sender.send(request).is_err() {
            self.in_flight.lock().remove(&key);
            return false;
        }
        true
    }

    /// Number of translations queued or running
    pub fn pending(&self) -> usize {
        self.in_flight.lock().len()
    }

    /// Finish the queued work and stop the thread
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        // Dropping the sender ends the receive loop once the queue drains
        self.sender.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                shader_error!("Shader compile thread panicked");
            }
        }
    }
}

impl Drop for CompileWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(cache: &ShaderCache, receiver: &Receiver<CompileRequest>, in_flight: &Mutex<HashSet<[u8; 32]>>) {
    cache_debug!("Shader compile thread started");
    for request in receiver.iter() {
        if let Err(e) = cache.get_or_compile(&request.program, &request.hints) {
            shader_error!("Background translation of {} failed: {}", hex::encode(request.key), e);
        }
        in_flight.lock().remove(&request.key);
    }
    cache_debug!("Shader compile thread stopped");
}
