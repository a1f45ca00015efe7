// src/events/sink.rs

//! Event sink implementations

use super::{Event, EventSink};
use crate::error::Result;
use std::cell::RefCell;
use std::io::Write;

/// Writes each record as one JSON line and flushes it immediately
#[derive(Debug)]
pub struct JsonLinesSink<W: Write> {
    writer: RefCell<W>,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: RefCell::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl JsonLinesSink<std::io::Stdout> {
    /// Sink on the process stdout
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write> EventSink for JsonLinesSink<W> {
    fn emit(&self, event: Event) -> Result<()> {
        let mut writer = self.writer.borrow_mut();
        serde_json::to_writer(&mut *writer, &event)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }
}

/// Keeps records in memory, for embedding and tests
#[derive(Debug, Default)]
pub struct CollectingSink {
    events: RefCell<Vec<Event>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records emitted so far
    pub fn events(&self) -> Vec<Event> {
        self.events.borrow().clone()
    }

    /// Drain the records emitted so far
    pub fn take(&self) -> Vec<Event> {
        std::mem::take(&mut *self.events.borrow_mut())
    }
}

impl EventSink for CollectingSink {
    fn emit(&self, event: Event) -> Result<()> {
        self.events.borrow_mut().push(event);
        Ok(())
    }
}
