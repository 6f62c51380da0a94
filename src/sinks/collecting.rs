//! An in-memory sink used by tests and by anything that wants a simple
//! record sink without touching the filesystem.

use crate::record::Record;
use crate::sink::Sink;
use parking_lot::Mutex;

pub struct CollectingSink {
    name: String,
    bodies: Mutex<Vec<String>>,
}

impl CollectingSink {
    pub fn new(name: impl Into<String>) -> Self {
        CollectingSink {
            name: name.into(),
            bodies: Mutex::new(Vec::new()),
        }
    }

    pub fn bodies(&self) -> Vec<String> {
        self.bodies.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.bodies.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Sink for CollectingSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn handle(&self, record: Record) {
        let body = record.with_message(|m| m.body.clone());
        self.bodies.lock().push(body);
    }
}
