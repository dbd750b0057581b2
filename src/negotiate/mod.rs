//! Terminal capability negotiation: identity from the environment, then protocol probes
//! answered over the same stream that carries keystrokes.

pub mod identity;
pub mod negotiator;
pub mod scanner;

pub use identity::{EnvSnapshot, NotificationProtocol, TerminalIdentity, TerminalInfo};
pub use negotiator::{
    CapabilityEvent, Feed, NegotiatedCapabilities, Negotiator, NegotiatorOptions, ProbeState,
};
pub use scanner::Appearance;
