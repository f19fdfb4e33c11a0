//! Scripted tag adapter for protocol tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::tagio::{TagIo, TagIoEvent};
use crate::Result;

/// What one read or write request should observe.
pub(crate) struct Script {
    events: Vec<TagIoEvent>,
    hang: bool,
}

impl Script {
    pub(crate) fn events(events: Vec<TagIoEvent>) -> Self {
        Self {
            events,
            hang: false,
        }
    }

    /// Emit `SenseStart` and then nothing, forever. For cancellation
    /// tests.
    pub(crate) fn hung() -> Self {
        Self {
            events: vec![TagIoEvent::SenseStart],
            hang: true,
        }
    }
}

pub(crate) struct MockTagIo {
    reads: Mutex<VecDeque<Script>>,
    writes: Mutex<VecDeque<Script>>,
    /// Payloads handed to `write_start`, in order.
    pub(crate) written: Mutex<Vec<Vec<u8>>>,
    /// The payload currently being emulated, if any.
    pub(crate) emulating: Mutex<Option<Vec<u8>>>,
    pub(crate) stops: AtomicUsize,
    /// Senders kept alive so a hung script never closes its channel.
    open: Mutex<Vec<mpsc::UnboundedSender<TagIoEvent>>>,
}

impl MockTagIo {
    pub(crate) fn new() -> Self {
        Self {
            reads: Mutex::new(VecDeque::new()),
            writes: Mutex::new(VecDeque::new()),
            written: Mutex::new(Vec::new()),
            emulating: Mutex::new(None),
            stops: AtomicUsize::new(0),
            open: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn script_read(&self, script: Script) {
        self.reads.lock().unwrap().push_back(script);
    }

    pub(crate) fn script_write(&self, script: Script) {
        self.writes.lock().unwrap().push_back(script);
    }

    /// Next read senses a card and delivers `payload`.
    pub(crate) fn read_payload(&self, payload: &[u8]) {
        self.script_read(Script::events(vec![
            TagIoEvent::SenseStart,
            TagIoEvent::ReadDone(payload.to_vec()),
        ]));
    }

    /// Next write is acknowledged.
    pub(crate) fn write_ok(&self) {
        self.script_write(Script::events(vec![TagIoEvent::WriteOk]));
    }

    /// Next write fails in hardware.
    pub(crate) fn write_fail(&self, message: &str) {
        self.script_write(Script::events(vec![TagIoEvent::Failed(
            message.to_string(),
        )]));
    }

    fn play(&self, script: Option<Script>) -> mpsc::UnboundedReceiver<TagIoEvent> {
        let script = script.unwrap_or_else(|| {
            Script::events(vec![TagIoEvent::Failed("no scripted result".into())])
        });
        let (tx, rx) = mpsc::unbounded_channel();
        for event in script.events {
            let _ = tx.send(event);
        }
        if script.hang {
            self.open.lock().unwrap().push(tx);
        }
        rx
    }
}

#[async_trait]
impl TagIo for MockTagIo {
    async fn read_start(&self) -> Result<mpsc::UnboundedReceiver<TagIoEvent>> {
        let script = self.reads.lock().unwrap().pop_front();
        Ok(self.play(script))
    }

    async fn write_start(&self, payload: Vec<u8>) -> Result<mpsc::UnboundedReceiver<TagIoEvent>> {
        self.written.lock().unwrap().push(payload);
        let script = self.writes.lock().unwrap().pop_front();
        Ok(self.play(script))
    }

    async fn emulate_start(&self, payload: Vec<u8>) -> Result<()> {
        *self.emulating.lock().unwrap() = Some(payload);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        *self.emulating.lock().unwrap() = None;
        self.open.lock().unwrap().clear();
        Ok(())
    }
}
