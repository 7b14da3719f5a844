//! Room struct definition
//!
//! The single chat room: live participants, nickname arbitration,
//! bounded recent history and broadcast fan-out.

use std::collections::{HashMap, HashSet, VecDeque};

use bytes::Bytes;
use tracing::debug;

use crate::frame::Frame;
use crate::participant::Participant;
use crate::types::ClientId;

/// Number of recent messages replayed to newly named participants
pub const MAX_RECENT_MESSAGES: usize = 100;

/// Chat room
///
/// Every entry in `bindings` has exactly one live participant and one
/// entry in `nicknames`. `history` never exceeds `MAX_RECENT_MESSAGES`.
#[derive(Debug, Default)]
pub struct Room {
    /// Live participants: ClientId -> Participant
    participants: HashMap<ClientId, Participant>,
    /// Nicknames currently taken
    nicknames: HashSet<Bytes>,
    /// Participant to nickname binding
    bindings: HashMap<ClientId, Bytes>,
    /// Recent broadcast messages, oldest first
    history: VecDeque<Frame>,
}

impl Room {
    /// Create an empty room
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a participant, unnamed
    pub fn join(&mut self, participant: Participant) {
        self.participants.insert(participant.id, participant);
    }

    /// Remove a participant and release its nickname
    ///
    /// Absent participants are ignored.
    pub fn leave(&mut self, client_id: ClientId) {
        if let Some(nickname) = self.bindings.remove(&client_id) {
            self.nicknames.remove(&nickname);
        }
        self.participants.remove(&client_id);
    }

    /// Try to bind `candidate` to the participant
    ///
    /// Returns false without any change if the nickname is taken or the
    /// participant is not live. On success the whole history is delivered
    /// to the participant, oldest first.
    pub fn try_bind_nickname(&mut self, client_id: ClientId, candidate: Bytes) -> bool {
        if self.nicknames.contains(&candidate) {
            return false;
        }
        let Some(participant) = self.participants.get(&client_id) else {
            return false;
        };

        if let Some(previous) = self.bindings.insert(client_id, candidate.clone()) {
            self.nicknames.remove(&previous);
        }
        self.nicknames.insert(candidate);

        for frame in &self.history {
            if participant.deliver(frame.clone()).is_err() {
                debug!("Replay to {} stopped, queue closed", client_id);
                break;
            }
        }

        true
    }

    /// Record a message in history and deliver it to every live participant
    ///
    /// The sender receives its own message too.
    pub fn broadcast(&mut self, frame: Frame) {
        self.history.push_back(frame.clone());
        while self.history.len() > MAX_RECENT_MESSAGES {
            self.history.pop_front();
        }

        for participant in self.participants.values() {
            if participant.deliver(frame.clone()).is_err() {
                debug!("Skipping {}, queue closed", participant.id);
            }
        }
    }

    /// Deliver a frame to one participant only
    pub fn send_to(&self, client_id: ClientId, frame: Frame) {
        if let Some(participant) = self.participants.get(&client_id) {
            if participant.deliver(frame).is_err() {
                debug!("Direct delivery to {} dropped, queue closed", client_id);
            }
        }
    }

    /// Check if a participant is live
    pub fn contains(&self, client_id: ClientId) -> bool {
        self.participants.contains_key(&client_id)
    }

    /// Nickname bound to a participant, if any
    pub fn nickname_of(&self, client_id: ClientId) -> Option<&Bytes> {
        self.bindings.get(&client_id)
    }

    /// Check if a nickname is taken
    pub fn is_taken(&self, nickname: &[u8]) -> bool {
        self.nicknames.contains(nickname)
    }

    /// Display name for logging: the nickname, or "unnamed"
    pub fn display_name(&self, client_id: ClientId) -> String {
        self.nickname_of(client_id)
            .map(|n| String::from_utf8_lossy(n).into_owned())
            .unwrap_or_else(|| "unnamed".to_string())
    }

    /// Get the number of live participants
    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }

    /// Get the number of taken nicknames
    pub fn nickname_count(&self) -> usize {
        self.nicknames.len()
    }

    /// Get the number of messages kept for replay
    pub fn history_len(&self) -> usize {
        self.history.len()
    }
}
