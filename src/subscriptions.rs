//! Desired-state registry of channel subscriptions.
//!
//! The registry only tracks intent. Whether a `subscribe`/`unsubscribe`
//! frame goes out immediately is the connection manager's call; after every
//! successful open the full set is re-announced verbatim. Nothing here is
//! ever cleared by a disconnect — only explicit unsubscribes remove entries.

/// Insertion-ordered, duplicate-free set of channel names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionRegistry {
    channels: Vec<String>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add channels, preserving first-seen order. Returns the channels that
    /// were actually new, in the order given.
    pub fn add<I>(&mut self, channels: I) -> Vec<String>
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let mut added = Vec::new();
        for channel in channels {
            let channel = channel.into();
            if channel.is_empty() || self.contains(&channel) || added.contains(&channel) {
                continue;
            }
            added.push(channel);
        }
        self.channels.extend(added.iter().cloned());
        added
    }

    /// Remove channels. Returns the channels that were actually present.
    pub fn remove<I>(&mut self, channels: I) -> Vec<String>
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let mut removed = Vec::new();
        for channel in channels {
            let channel = channel.into();
            if let Some(index) = self.channels.iter().position(|c| *c == channel) {
                self.channels.remove(index);
                removed.push(channel);
            }
        }
        removed
    }

    pub fn contains(&self, channel: &str) -> bool {
        self.channels.iter().any(|c| c == channel)
    }

    /// The full desired set, in subscription order.
    pub fn channels(&self) -> &[String] {
        &self.channels
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.channels.clone()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}
