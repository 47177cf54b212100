//! Reconnect state machine.
//!
//! [`ReconnectMachine`] holds no timers and performs no I/O. The
//! subscription driver feeds it [`Signal`]s and carries out the returned
//! [`Directive`]s, so every transition can be exercised synchronously.

use std::time::Duration;

use crate::types::ConnectionState;

/// Retry limits and linear backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Automatic attempts allowed before giving up
    pub max_attempts: u32,
    /// Attempt `n` waits `n * base_delay`
    pub base_delay: Duration,
}

impl ReconnectPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Delay before reconnect attempt number `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_millis(2000))
    }
}

/// Inputs to the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// A new subscription was requested
    Connect,
    /// The transport (or the server's `connected` event) confirmed the subscription
    Opened,
    /// The transport failed or ended
    TransportError,
    /// The scheduled reconnect delay ran out
    RetryElapsed,
    /// Intentional teardown
    Disconnect,
    /// Explicit user-requested reconnect
    ManualReconnect,
}

/// What the driver must do after a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    None,
    /// Open a transport to the subscribed endpoint
    Open,
    /// Sleep, then feed [`Signal::RetryElapsed`]
    Wait(Duration),
    /// Retries are used up; surface a terminal failure and stop
    Exhausted { attempts: u32 },
    /// Stop: release the transport and cancel pending timers
    Halt,
}

/// Read-only view of the reconnect counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReconnectStatus {
    pub attempts: u32,
    pub max_attempts: u32,
    pub is_reconnecting: bool,
    pub exhausted: bool,
}

#[derive(Debug, Clone)]
pub struct ReconnectMachine {
    policy: ReconnectPolicy,
    state: ConnectionState,
    attempts: u32,
    intentional: bool,
    waiting: bool,
    exhausted: bool,
}

impl ReconnectMachine {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            state: ConnectionState::Closed,
            attempts: 0,
            intentional: false,
            waiting: false,
            exhausted: false,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    pub fn status(&self) -> ReconnectStatus {
        ReconnectStatus {
            attempts: self.attempts,
            max_attempts: self.policy.max_attempts,
            is_reconnecting: self.waiting,
            exhausted: self.exhausted,
        }
    }

    /// Apply one signal and return the directive for the driver
    pub fn handle(&mut self, signal: Signal) -> Directive {
        match signal {
            Signal::Connect => {
                if matches!(
                    self.state,
                    ConnectionState::Connecting | ConnectionState::Open
                ) && !self.intentional
                {
                    return Directive::None;
                }
                self.intentional = false;
                self.waiting = false;
                self.exhausted = false;
                self.state = ConnectionState::Connecting;
                Directive::Open
            }
            Signal::Opened => {
                if self.intentional {
                    return Directive::None;
                }
                self.state = ConnectionState::Open;
                self.attempts = 0;
                self.waiting = false;
                self.exhausted = false;
                Directive::None
            }
            Signal::TransportError => {
                if self.intentional {
                    return Directive::Halt;
                }
                if self.exhausted || self.waiting {
                    return Directive::None;
                }
                self.state = ConnectionState::Errored;
                if self.attempts < self.policy.max_attempts {
                    self.attempts += 1;
                    self.waiting = true;
                    Directive::Wait(self.policy.delay_for(self.attempts))
                } else {
                    self.exhausted = true;
                    Directive::Exhausted {
                        attempts: self.attempts,
                    }
                }
            }
            Signal::RetryElapsed => {
                if self.intentional || !self.waiting {
                    return Directive::None;
                }
                self.waiting = false;
                self.state = ConnectionState::Connecting;
                Directive::Open
            }
            Signal::Disconnect => {
                self.intentional = true;
                self.waiting = false;
                self.exhausted = false;
                self.attempts = 0;
                self.state = ConnectionState::Closed;
                Directive::Halt
            }
            Signal::ManualReconnect => {
                self.intentional = false;
                self.waiting = false;
                self.exhausted = false;
                self.attempts = 0;
                self.state = ConnectionState::Connecting;
                Directive::Open
            }
        }
    }
}
