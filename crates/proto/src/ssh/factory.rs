//! Phase-scoped message dispatch table.
//!
//! The [`MessageFactory`] maps a wire message number to the constructor of
//! the message that is currently valid for that number. Entries start
//! disabled; the session and the authentication methods enable what the
//! current negotiation phase expects and disable it again afterwards.
//!
//! Each entry carries two flags:
//!
//! - `enabled`: dispatchable right now
//! - `activated`: enabled at some point and not explicitly deactivated, so
//!   it is restored after a key re-exchange
//!
//! At most one entry is enabled per number. This is what tells the three
//! number-60 messages apart.
//!
//! # Example
//!
//! ```rust
//! use tether_proto::ssh::factory::MessageFactory;
//!
//! let mut factory = MessageFactory::new();
//! factory.enable_and_activate("SSH_MSG_USERAUTH_PK_OK").unwrap();
//!
//! // Another number-60 message cannot be enabled at the same time
//! assert!(factory.enable_and_activate("SSH_MSG_USERAUTH_INFO_REQUEST").is_err());
//!
//! factory.disable_and_deactivate("SSH_MSG_USERAUTH_PK_OK").unwrap();
//! factory.enable_and_activate("SSH_MSG_USERAUTH_INFO_REQUEST").unwrap();
//! ```

use crate::ssh::logging;
use crate::ssh::message::{MessageType, SshMessage};
use tether_platform::{DispatchError, TetherError, TetherResult};

/// Messages that stay dispatchable during a key exchange.
pub fn is_key_exchange_safe(number: u8) -> bool {
    matches!(number, 1..=4 | 20..=49)
}

/// One registry entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageMetadata {
    message_type: MessageType,
    enabled: bool,
    activated: bool,
}

impl MessageMetadata {
    fn new(message_type: MessageType) -> Self {
        Self {
            message_type,
            enabled: false,
            activated: false,
        }
    }

    /// Catalog entry.
    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    /// Wire number.
    pub fn number(&self) -> u8 {
        self.message_type.number()
    }

    /// Canonical name.
    pub fn name(&self) -> &'static str {
        self.message_type.name()
    }

    /// Whether the entry is dispatchable.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether the entry is restored by [`MessageFactory::enable_activated_messages`].
    pub fn is_activated(&self) -> bool {
        self.activated
    }
}

/// Dispatch table from message number to message constructor.
#[derive(Debug, Clone)]
pub struct MessageFactory {
    metadata: Vec<MessageMetadata>,
    /// Index into `metadata` of the enabled entry, per number
    enabled: [Option<usize>; 256],
}

impl Default for MessageFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageFactory {
    /// Creates a factory with every registered message disabled.
    pub fn new() -> Self {
        Self {
            metadata: MessageType::ALL
                .iter()
                .copied()
                .map(MessageMetadata::new)
                .collect(),
            enabled: [None; 256],
        }
    }

    /// Registry entries, in registry order.
    pub fn metadata(&self) -> &[MessageMetadata] {
        &self.metadata
    }

    /// Returns the entry currently enabled for `number`.
    pub fn enabled_for(&self, number: u8) -> Option<MessageType> {
        self.enabled[number as usize].map(|index| self.metadata[index].message_type)
    }

    /// Whether the named message is enabled.
    pub fn is_enabled(&self, name: &str) -> bool {
        self.metadata
            .iter()
            .any(|m| m.name() == name && m.enabled)
    }

    /// Creates a blank instance of the message enabled for `number`.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::NotSupported`] if no entry has this number
    /// - [`DispatchError::NotValidInContext`] if entries exist but none is enabled
    pub fn create(&self, number: u8) -> Result<SshMessage, DispatchError> {
        if let Some(index) = self.enabled[number as usize] {
            let metadata = &self.metadata[index];
            if metadata.activated {
                return Ok(metadata.message_type.instantiate());
            }
        }

        if self.metadata.iter().any(|m| m.number() == number) {
            Err(DispatchError::NotValidInContext(number))
        } else {
            Err(DispatchError::NotSupported(number))
        }
    }

    /// Creates and loads the message for a full payload.
    ///
    /// # Errors
    ///
    /// [`TetherError::Protocol`] for an empty or malformed payload,
    /// [`TetherError::Dispatch`] if the number is not dispatchable.
    pub fn decode(&self, payload: &[u8]) -> TetherResult<SshMessage> {
        let number = *payload
            .first()
            .ok_or_else(|| TetherError::Protocol("Empty message payload".to_string()))?;

        let mut message = self.create(number)?;
        message.load(payload)?;
        logging::log_message_recv(message.message_type().name(), payload.len());
        Ok(message)
    }

    /// Enables and activates the named message.
    ///
    /// Re-enabling an already enabled entry is a no-op.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::UnknownName`] if no entry has this name
    /// - [`DispatchError::Conflict`] if another entry with the same number is enabled
    pub fn enable_and_activate(&mut self, name: &str) -> Result<(), DispatchError> {
        let index = self.index_of(name)?;
        self.enable_index(index)?;
        self.metadata[index].activated = true;
        Ok(())
    }

    /// Disables and deactivates the named message. Idempotent.
    ///
    /// # Errors
    ///
    /// [`DispatchError::UnknownName`] if no entry has this name.
    pub fn disable_and_deactivate(&mut self, name: &str) -> Result<(), DispatchError> {
        let index = self.index_of(name)?;
        self.disable_index(index);
        self.metadata[index].activated = false;
        Ok(())
    }

    /// Disables every entry outside the key-exchange-safe set, keeping it
    /// activated.
    pub fn disable_non_key_exchange_messages(&mut self) {
        for index in 0..self.metadata.len() {
            if !is_key_exchange_safe(self.metadata[index].number()) {
                self.disable_index(index);
            }
        }
    }

    /// Re-enables every activated entry.
    ///
    /// # Errors
    ///
    /// [`DispatchError::Conflict`] if two activated entries share a number.
    /// Nothing is changed in that case.
    pub fn enable_activated_messages(&mut self) -> Result<(), DispatchError> {
        let mut pending = self.enabled;
        for (index, metadata) in self.metadata.iter().enumerate() {
            if !metadata.activated {
                continue;
            }
            let slot = &mut pending[metadata.number() as usize];
            match *slot {
                Some(other) if other != index => {
                    return Err(self.conflict(index, other));
                }
                _ => *slot = Some(index),
            }
        }

        for index in 0..self.metadata.len() {
            if self.metadata[index].activated && !self.metadata[index].enabled {
                self.metadata[index].enabled = true;
                logging::log_dispatch_change(
                    self.metadata[index].name(),
                    self.metadata[index].number(),
                    true,
                );
            }
        }
        self.enabled = pending;
        Ok(())
    }

    fn index_of(&self, name: &str) -> Result<usize, DispatchError> {
        self.metadata
            .iter()
            .position(|m| m.name() == name)
            .ok_or_else(|| DispatchError::UnknownName(name.to_string()))
    }

    fn enable_index(&mut self, index: usize) -> Result<(), DispatchError> {
        let number = self.metadata[index].number();
        match self.enabled[number as usize] {
            Some(current) if current == index => Ok(()),
            Some(current) => Err(self.conflict(index, current)),
            None => {
                self.enabled[number as usize] = Some(index);
                self.metadata[index].enabled = true;
                logging::log_dispatch_change(self.metadata[index].name(), number, true);
                Ok(())
            }
        }
    }

    fn disable_index(&mut self, index: usize) {
        let number = self.metadata[index].number() as usize;
        if self.enabled[number] == Some(index) {
            self.enabled[number] = None;
        }
        if self.metadata[index].enabled {
            self.metadata[index].enabled = false;
            logging::log_dispatch_change(self.metadata[index].name(), number as u8, false);
        }
    }

    fn conflict(&self, requested: usize, enabled: usize) -> DispatchError {
        DispatchError::Conflict {
            requested: self.metadata[requested].name().to_string(),
            number: self.metadata[requested].number(),
            enabled: self.metadata[enabled].name().to_string(),
        }
    }
}
