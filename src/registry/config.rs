//! Registry configuration

/// Whether a broadcast is delivered back to the connection it came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EchoPolicy {
    /// Every current member receives the message, sender included
    #[default]
    IncludeSender,
    /// Every member except the originating connection receives the message
    ExcludeSender,
}

/// Fan-out registry options
#[derive(Debug, Clone, Default)]
pub struct RegistryConfig {
    /// Sender echo policy
    pub echo_policy: EchoPolicy,
}

impl RegistryConfig {
    /// Set the echo policy
    pub fn echo_policy(mut self, policy: EchoPolicy) -> Self {
        self.echo_policy = policy;
        self
    }

    /// Do not deliver messages back to their originating connection
    pub fn exclude_sender(self) -> Self {
        self.echo_policy(EchoPolicy::ExcludeSender)
    }
}
