//! Asynchronous capability probing over the input stream.
//!
//! The negotiator never reads or writes on its own. Callers hand it input chunks and the clock;
//! it returns the bytes that belong to the application, the commands to write, and the
//! capability changes it resolved.

use std::time::{Duration, Instant};

use tracing::debug;

use crate::core::image::{CellDimensions, ImageProtocol};
use crate::core::output::TerminalCmd;

use super::identity::TerminalInfo;
use super::scanner::{
    Appearance, AppearanceScanner, CellSizeScanner, KittyReplyScanner, SixelReplyScanner,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NegotiatorOptions {
    pub kitty_timeout: Duration,
    pub sixel_timeout: Duration,
    pub cell_size_timeout: Duration,
    /// How long the initial appearance query may take before later reports count as changes.
    pub appearance_timeout: Duration,
    /// How long an unfinished reply prefix is held back from the application.
    pub tail_timeout: Duration,
}

impl Default for NegotiatorOptions {
    fn default() -> Self {
        Self {
            kitty_timeout: Duration::from_millis(250),
            sixel_timeout: Duration::from_millis(150),
            cell_size_timeout: Duration::from_millis(250),
            appearance_timeout: Duration::from_millis(250),
            tail_timeout: Duration::from_millis(50),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeState<T> {
    Idle,
    Pending { deadline: Instant },
    Resolved(T),
}

impl<T: Copy> ProbeState<T> {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending { .. })
    }

    pub fn resolved(&self) -> Option<T> {
        match self {
            Self::Resolved(value) => Some(*value),
            _ => None,
        }
    }

    fn deadline(&self) -> Option<Instant> {
        match self {
            Self::Pending { deadline } => Some(*deadline),
            _ => None,
        }
    }

    fn expired(&self, now: Instant) -> bool {
        matches!(self, Self::Pending { deadline } if now >= *deadline)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityEvent {
    KittyKeyboard(bool),
    Sixel(bool),
    CellSize(CellDimensions),
    AppearanceChanged(Appearance),
}

/// Everything probing has established so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NegotiatedCapabilities {
    pub kitty_keyboard: bool,
    pub sixel: Option<bool>,
    /// Measured cell size, or the default when unmeasured.
    pub cell_size: CellDimensions,
    pub appearance: Option<Appearance>,
    pub image_protocol: Option<ImageProtocol>,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct Feed {
    pub passthrough: String,
    pub cmds: Vec<TerminalCmd>,
    pub events: Vec<CapabilityEvent>,
}

impl Feed {
    pub fn is_empty(&self) -> bool {
        self.passthrough.is_empty() && self.cmds.is_empty() && self.events.is_empty()
    }
}

#[derive(Debug, Default)]
struct AppearanceState {
    subscribed: bool,
    /// Set while our own query is outstanding; its reply must not look like a change.
    awaiting_initial: Option<Instant>,
    current: Option<Appearance>,
}

pub struct Negotiator {
    info: TerminalInfo,
    options: NegotiatorOptions,
    kitty: ProbeState<bool>,
    kitty_pushed: bool,
    sixel: ProbeState<bool>,
    sixel_negatives: u8,
    cell_size: ProbeState<CellDimensions>,
    appearance: AppearanceState,
    kitty_scanner: KittyReplyScanner,
    sixel_scanner: SixelReplyScanner,
    cell_scanner: CellSizeScanner,
    appearance_scanner: AppearanceScanner,
    tail_since: Option<Instant>,
}

impl Negotiator {
    pub fn new(info: TerminalInfo, options: NegotiatorOptions) -> Self {
        Self {
            info,
            options,
            kitty: ProbeState::Idle,
            kitty_pushed: false,
            sixel: ProbeState::Idle,
            sixel_negatives: 0,
            cell_size: ProbeState::Idle,
            appearance: AppearanceState::default(),
            kitty_scanner: KittyReplyScanner::new(),
            sixel_scanner: SixelReplyScanner::new(),
            cell_scanner: CellSizeScanner::new(),
            appearance_scanner: AppearanceScanner::new(),
            tail_since: None,
        }
    }

    pub fn info(&self) -> &TerminalInfo {
        &self.info
    }

    /// Startup queries. Image probes only run where the identity makes them meaningful.
    pub fn begin(&mut self, now: Instant) -> Vec<TerminalCmd> {
        let mut cmds = Vec::new();
        cmds.extend(self.probe_kitty(now));
        if !self.appearance.subscribed {
            self.appearance.subscribed = true;
            self.appearance.awaiting_initial = Some(now + self.options.appearance_timeout);
            cmds.push(TerminalCmd::AppearanceSubscribe);
            cmds.push(TerminalCmd::AppearanceQuery);
        }
        if self.info.image_protocol.is_none() && self.info.multiplexed {
            cmds.extend(self.probe_sixel(now));
        }
        if self.info.image_protocol.is_some() {
            cmds.extend(self.probe_cell_size(now));
        }
        cmds
    }

    pub fn probe_kitty(&mut self, now: Instant) -> Option<TerminalCmd> {
        if self.kitty.is_pending() || self.kitty_pushed {
            return None;
        }
        self.kitty = ProbeState::Pending {
            deadline: now + self.options.kitty_timeout,
        };
        Some(TerminalCmd::KittyQuery)
    }

    pub fn probe_sixel(&mut self, now: Instant) -> Option<TerminalCmd> {
        if self.sixel.is_pending() {
            return None;
        }
        self.sixel = ProbeState::Pending {
            deadline: now + self.options.sixel_timeout,
        };
        self.sixel_negatives = 0;
        Some(TerminalCmd::SixelProbe)
    }

    pub fn probe_cell_size(&mut self, now: Instant) -> Option<TerminalCmd> {
        if self.cell_size.is_pending() {
            return None;
        }
        self.cell_size = ProbeState::Pending {
            deadline: now + self.options.cell_size_timeout,
        };
        Some(TerminalCmd::QueryCellSize)
    }

    /// Runs one input chunk through every scanner.
    pub fn feed(&mut self, chunk: &str, now: Instant) -> Feed {
        let mut feed = Feed::default();

        let kitty = self.kitty_scanner.scan(chunk);
        for flags in kitty.found {
            self.on_kitty_reply(flags, &mut feed);
        }
        let sixel = self.sixel_scanner.scan(&kitty.passthrough);
        for answer in sixel.found {
            self.on_sixel_answer(answer.supports_sixel(), now, &mut feed);
        }
        let cell = self.cell_scanner.scan(&sixel.passthrough);
        for dims in cell.found {
            self.on_cell_size(dims, &mut feed);
        }
        let appearance = self.appearance_scanner.scan(&cell.passthrough);
        for report in appearance.found {
            self.on_appearance(report, &mut feed);
        }
        feed.passthrough = appearance.passthrough;

        self.tail_since = if self.has_tail() {
            self.tail_since.or(Some(now))
        } else {
            None
        };
        feed
    }

    /// Resolves expired probes and releases stale reply prefixes.
    pub fn tick(&mut self, now: Instant) -> Feed {
        let mut feed = Feed::default();

        if self.kitty.expired(now) {
            debug!("kitty keyboard probe timed out");
            self.kitty = ProbeState::Resolved(false);
            feed.events.push(CapabilityEvent::KittyKeyboard(false));
        }
        if self.sixel.expired(now) {
            debug!("sixel probe timed out");
            self.sixel = ProbeState::Resolved(false);
            feed.events.push(CapabilityEvent::Sixel(false));
        }
        if self.cell_size.expired(now) {
            let fallback = CellDimensions::default();
            debug!(?fallback, "cell size probe timed out, using default");
            self.cell_size = ProbeState::Resolved(fallback);
            feed.events.push(CapabilityEvent::CellSize(fallback));
        }
        if matches!(self.appearance.awaiting_initial, Some(deadline) if now >= deadline) {
            self.appearance.awaiting_initial = None;
        }
        if matches!(self.tail_since, Some(since) if now >= since + self.options.tail_timeout) {
            feed.passthrough = self.release_tails();
        }
        feed
    }

    /// Hands back every held prefix as ordinary input, oldest first.
    pub fn release_tails(&mut self) -> String {
        self.tail_since = None;
        // Later scanners only ever saw input preceding an earlier scanner's tail.
        let mut out = self.appearance_scanner.flush();
        out.push_str(&self.cell_scanner.flush());
        out.push_str(&self.sixel_scanner.flush());
        out.push_str(&self.kitty_scanner.flush());
        out
    }

    pub fn has_tail(&self) -> bool {
        self.kitty_scanner.has_tail()
            || self.sixel_scanner.has_tail()
            || self.cell_scanner.has_tail()
            || self.appearance_scanner.has_tail()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        [
            self.kitty.deadline(),
            self.sixel.deadline(),
            self.cell_size.deadline(),
            self.appearance.awaiting_initial,
            self.tail_since.map(|since| since + self.options.tail_timeout),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    pub fn kitty_active(&self) -> bool {
        self.kitty_pushed
    }

    pub fn snapshot(&self) -> NegotiatedCapabilities {
        let sixel = self.sixel.resolved();
        let image_protocol = self
            .info
            .image_protocol
            .or_else(|| (sixel == Some(true)).then_some(ImageProtocol::Sixel));
        NegotiatedCapabilities {
            kitty_keyboard: self.kitty_pushed,
            sixel,
            cell_size: self.cell_size.resolved().unwrap_or_default(),
            appearance: self.appearance.current,
            image_protocol,
        }
    }

    /// Pops enhanced keyboard flags if they were pushed. A still-pending probe is abandoned so
    /// a late reply cannot push them again.
    pub fn disable_kitty(&mut self) -> Option<TerminalCmd> {
        if self.kitty.is_pending() {
            self.kitty = ProbeState::Resolved(false);
        }
        if !self.kitty_pushed {
            return None;
        }
        self.kitty_pushed = false;
        Some(TerminalCmd::KittyPop)
    }

    /// Undoes every mode the negotiator turned on.
    pub fn shutdown_cmds(&mut self) -> Vec<TerminalCmd> {
        let mut cmds: Vec<TerminalCmd> = self.disable_kitty().into_iter().collect();
        if self.appearance.subscribed {
            self.appearance.subscribed = false;
            self.appearance.awaiting_initial = None;
            cmds.push(TerminalCmd::AppearanceUnsubscribe);
        }
        cmds
    }

    fn on_kitty_reply(&mut self, flags: u32, feed: &mut Feed) {
        if !self.kitty.is_pending() {
            debug!(flags, "ignoring unsolicited kitty keyboard reply");
            return;
        }
        debug!(flags, "kitty keyboard protocol available");
        self.kitty = ProbeState::Resolved(true);
        self.kitty_pushed = true;
        feed.cmds.push(TerminalCmd::KittyPush);
        feed.events.push(CapabilityEvent::KittyKeyboard(true));
    }

    fn on_sixel_answer(&mut self, supported: bool, now: Instant, feed: &mut Feed) {
        if !self.sixel.is_pending() {
            return;
        }
        if supported {
            debug!("sixel graphics confirmed");
            self.sixel = ProbeState::Resolved(true);
            feed.events.push(CapabilityEvent::Sixel(true));
            if self.cell_size == ProbeState::Idle {
                feed.cmds.extend(self.probe_cell_size(now));
            }
            return;
        }
        self.sixel_negatives += 1;
        // Both queries answered without confirming sixel.
        if self.sixel_negatives >= 2 {
            self.sixel = ProbeState::Resolved(false);
            feed.events.push(CapabilityEvent::Sixel(false));
        }
    }

    fn on_cell_size(&mut self, dims: CellDimensions, feed: &mut Feed) {
        if self.cell_size.resolved() == Some(dims) {
            return;
        }
        debug!(?dims, "cell size reported");
        self.cell_size = ProbeState::Resolved(dims);
        feed.events.push(CapabilityEvent::CellSize(dims));
    }

    fn on_appearance(&mut self, report: Appearance, feed: &mut Feed) {
        if self.appearance.awaiting_initial.take().is_some() {
            self.appearance.current = Some(report);
            return;
        }
        self.appearance.current = Some(report);
        feed.events.push(CapabilityEvent::AppearanceChanged(report));
    }
}
