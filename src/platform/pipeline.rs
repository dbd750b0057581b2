//! Raw stdin bytes to application input, with protocol replies filtered out.

use std::time::Instant;

use crate::core::output::{TerminalCmd, PASTE_END, PASTE_START};
use crate::negotiate::{CapabilityEvent, Feed, Negotiator};

use super::stdin_buffer::{StdinBuffer, StdinEvent};

/// What one step of the pipeline produced.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct PipelineOutput {
    /// Sequences for the application's input handler, in arrival order.
    pub inputs: Vec<String>,
    /// Writes requested by the negotiator (e.g. pushing keyboard flags).
    pub cmds: Vec<TerminalCmd>,
    pub events: Vec<CapabilityEvent>,
}

impl PipelineOutput {
    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty() && self.cmds.is_empty() && self.events.is_empty()
    }

    fn absorb(&mut self, feed: Feed) {
        if !feed.passthrough.is_empty() {
            self.inputs.push(feed.passthrough);
        }
        self.cmds.extend(feed.cmds);
        self.events.extend(feed.events);
    }

    fn push_input(&mut self, data: String) {
        if !data.is_empty() {
            self.inputs.push(data);
        }
    }
}

/// Stdin reassembly followed by reply scanning.
///
/// Pastes skip the scanners entirely: pasted text that happens to look like a terminal reply is
/// still the user's text.
pub struct InputPipeline {
    stdin: StdinBuffer,
    negotiator: Negotiator,
}

impl InputPipeline {
    pub fn new(stdin: StdinBuffer, negotiator: Negotiator) -> Self {
        Self { stdin, negotiator }
    }

    pub fn negotiator(&self) -> &Negotiator {
        &self.negotiator
    }

    pub fn negotiator_mut(&mut self) -> &mut Negotiator {
        &mut self.negotiator
    }

    pub fn process(&mut self, bytes: &[u8], now: Instant) -> PipelineOutput {
        let events = self.stdin.process(bytes, now);
        let mut out = PipelineOutput::default();
        self.route(events, now, &mut out);
        out
    }

    /// Flushes timed-out escape fragments and resolves expired probes.
    pub fn tick(&mut self, now: Instant) -> PipelineOutput {
        let mut out = PipelineOutput::default();
        let flushed = self.stdin.flush_due(now);
        if !flushed.is_empty() {
            self.route(flushed, now, &mut out);
            // A timed-out fragment will not be completed by a later read.
            let released = self.negotiator.release_tails();
            out.push_input(released);
        }
        out.absorb(self.negotiator.tick(now));
        out
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.stdin.next_deadline(), self.negotiator.next_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Drops buffered input without delivering it.
    pub fn clear(&mut self) {
        self.stdin.clear();
        self.negotiator.release_tails();
    }

    fn route(&mut self, events: Vec<StdinEvent>, now: Instant, out: &mut PipelineOutput) {
        for event in events {
            match event {
                StdinEvent::Data(data) => out.absorb(self.negotiator.feed(&data, now)),
                StdinEvent::Paste(content) => {
                    let released = self.negotiator.release_tails();
                    out.push_input(released);
                    out.inputs.push(format!("{PASTE_START}{content}{PASTE_END}"));
                }
            }
        }
    }
}
