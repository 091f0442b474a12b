//! Host configuration

use std::time::Duration;

/// What to do with a Number Of Completed Packets entry for a handle that is no
/// longer in the connection table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompletedPacketsPolicy {
    /// Skip the stale entry and keep accounting for the rest of the batch
    #[default]
    SkipUnknown,
    /// Stop processing the whole event at the first stale entry
    AbortBatch,
}

/// Flow-control and timing parameters for a [`Host`](crate::host::Host)
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Upper bound on command credits the controller may grant
    pub max_outstanding_commands: usize,
    /// Command credits available before the controller reports any
    pub initial_command_credits: usize,
    /// Controller ACL buffers, used until LE Read Buffer Size says otherwise
    pub acl_buffers: usize,
    /// Largest ACL payload the controller accepts in one packet
    pub acl_mtu: usize,
    /// How long a sender waits for its command to complete; `None` waits forever
    pub command_timeout: Option<Duration>,
    /// Handling of completed-packet reports that name a handle no longer connected
    pub completed_packets_policy: CompletedPacketsPolicy,
    /// Inbound ACL packets buffered per connection before the oldest is dropped
    pub rx_queue_depth: usize,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            max_outstanding_commands: 1,
            initial_command_credits: 1,
            acl_buffers: 8,
            acl_mtu: 27,
            command_timeout: Some(Duration::from_secs(5)),
            completed_packets_policy: CompletedPacketsPolicy::SkipUnknown,
            rx_queue_depth: 32,
        }
    }
}

impl HostConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_outstanding_commands(mut self, max: usize) -> Self {
        self.max_outstanding_commands = max.max(1);
        self.initial_command_credits = self.initial_command_credits.min(self.max_outstanding_commands);
        self
    }

    pub fn with_initial_command_credits(mut self, credits: usize) -> Self {
        self.initial_command_credits = credits.min(self.max_outstanding_commands);
        self
    }

    pub fn with_acl_buffers(mut self, buffers: usize, mtu: usize) -> Self {
        self.acl_buffers = buffers;
        self.acl_mtu = mtu.max(1);
        self
    }

    pub fn with_command_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn with_completed_packets_policy(mut self, policy: CompletedPacketsPolicy) -> Self {
        self.completed_packets_policy = policy;
        self
    }

    pub fn with_rx_queue_depth(mut self, depth: usize) -> Self {
        self.rx_queue_depth = depth.max(1);
        self
    }
}
