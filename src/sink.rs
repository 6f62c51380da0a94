//! The external-collaborator boundary every sink implements. Console/terminal
//! rendering is explicitly out of scope here — a console sink is just
//! another `Sink` impl living outside this crate.

use crate::record::Record;

pub trait Sink: Send + Sync {
    fn name(&self) -> &str;

    /// Takes ownership of (and therefore releases, on drop) one record.
    fn handle(&self, record: Record);

    /// Default batch path: release records in order. Sinks with a cheaper
    /// batched write path (the rotating-file sink, for instance) override
    /// this.
    fn handle_many(&self, records: Vec<Record>) {
        for record in records {
            self.handle(record);
        }
    }

    /// Declares whether this sink is safe to use with pooled records: it
    /// must not retain a record past the call that handed it over.
    fn supports_refcounted_release(&self) -> bool {
        true
    }

    fn flush(&self) {}

    fn shutdown(&self) {}
}
